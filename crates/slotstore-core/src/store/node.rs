//! Node store: `[in_use][next_rel u32][next_prop u32]`, 9 bytes

use super::{Record, get_pointer, load_record, put_pointer, save_record};
use crate::config::StoreConfig;
use crate::id_allocator::NO_ID;
use crate::store::record_store::{RecordStore, StoreFormat};
use crate::window::OwnerToken;
use crate::Result;
use bytes::BytesMut;
use std::path::Path;

/// Descriptor written at the end of the node store
pub const NODE_STORE_DESCRIPTOR: &str = "NodeStore v1.0";

/// Node record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// Node id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// First relationship, or [`NO_ID`]
    pub next_rel: u64,
    /// First property, or [`NO_ID`]
    pub next_prop: u64,
}

impl NodeRecord {
    /// In-use node without relationships or properties
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            next_rel: NO_ID,
            next_prop: NO_ID,
        }
    }
}

impl Record for NodeRecord {
    const RECORD_SIZE: usize = 9;

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn put_fields(&self, buf: &mut BytesMut) -> Result<()> {
        put_pointer(buf, self.next_rel)?;
        put_pointer(buf, self.next_prop)
    }

    fn get_fields(id: u64, buf: &mut &[u8]) -> Self {
        Self {
            id,
            in_use: true,
            next_rel: get_pointer(buf),
            next_prop: get_pointer(buf),
        }
    }
}

/// Store of [`NodeRecord`]s
#[derive(Debug)]
pub struct NodeStore {
    store: RecordStore,
}

impl NodeStore {
    /// File format of the node store
    pub fn format() -> StoreFormat {
        StoreFormat::new(NODE_STORE_DESCRIPTOR, NodeRecord::RECORD_SIZE).with_legacy("NodeStore v0.9")
    }

    /// Create an empty node store
    pub fn create(path: &Path) -> Result<()> {
        RecordStore::create(path, &Self::format())
    }

    /// Open a node store
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            store: RecordStore::open(path, Self::format(), config)?,
        })
    }

    /// The underlying record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Allocate a node id
    pub fn next_id(&self) -> Result<u64> {
        self.store.next_id()
    }

    /// Read node `id`
    pub fn get_record(&self, id: u64, owner: OwnerToken) -> Result<NodeRecord> {
        load_record(&self.store, id, owner)
    }

    /// Write a node, or delete it when it is not in use
    pub fn update_record(&self, record: &NodeRecord, owner: OwnerToken) -> Result<()> {
        save_record(&self.store, record, owner)
    }

    /// Close the store
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
