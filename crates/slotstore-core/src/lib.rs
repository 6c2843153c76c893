//! Slotstore Core - fixed-record storage engine for a property graph
//!
//! Every entity of the graph lives in a flat file of fixed-size slots, one
//! slot per record id:
//! - Id allocation with a companion `.id` file that recycles freed ids
//! - A window pool caching records as row windows or memory-mapped bricks
//! - Fixed record stores that repair themselves after an unclean shutdown
//! - Dynamic stores chaining fixed blocks for strings and arrays
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Graph store set                 │
//! │  (node, relationship, type, property files) │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │      Record stores / Dynamic stores         │
//! │   (slot layout, descriptor, rebuild scan)   │
//! └───────┬──────────────────────┬──────────────┘
//!         │                      │
//! ┌───────┴────────┐    ┌────────┴─────────────┐
//! │  Id allocator  │    │     Window pool      │
//! │  (<store>.id)  │    │ (row windows, bricks)│
//! └────────────────┘    └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use slotstore_core::store::{GraphStores, NodeRecord};
//! use slotstore_core::{OwnerToken, StoreConfig};
//! use std::path::Path;
//!
//! let dir = Path::new("./graph.db");
//! let config = StoreConfig::default();
//! GraphStores::create(dir, &config)?;
//! let stores = GraphStores::open(dir, &config)?;
//!
//! let owner = OwnerToken::new();
//! let id = stores.nodes().next_id()?;
//! stores.nodes().update_record(&NodeRecord::new(id), owner)?;
//! stores.close()?;
//! # Ok::<(), slotstore_core::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod id_allocator;
pub mod store;
pub mod window;

pub use config::{BrickPolicy, StoreConfig};
pub use error::{Error, Result};
pub use id_allocator::{IdAllocator, NO_ID, RebuildReport};
pub use store::{RecordStore, StoreFormat, StoreStats};
pub use window::{OpType, OwnerToken, WindowGuard, WindowKind, WindowPool};
