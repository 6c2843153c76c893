//! Relationship store, 33-byte records
//!
//! ```text
//! [in_use][first_node][second_node][type]
//!         [first_prev_rel][first_next_rel][second_prev_rel][second_next_rel]
//!         [next_prop]                                   (u32 each)
//! ```
//!
//! Each relationship sits in two doubly linked lists, one per endpoint.

use super::{Record, get_pointer, load_record, put_pointer, save_record};
use crate::config::StoreConfig;
use crate::id_allocator::NO_ID;
use crate::store::record_store::{RecordStore, StoreFormat};
use crate::window::OwnerToken;
use crate::Result;
use bytes::{Buf, BufMut, BytesMut};
use std::path::Path;

/// Descriptor written at the end of the relationship store
pub const RELATIONSHIP_STORE_DESCRIPTOR: &str = "RelationshipStore v1.0";

/// Relationship record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// Relationship id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Start node
    pub first_node: u64,
    /// End node
    pub second_node: u64,
    /// Relationship type id
    pub rel_type: u32,
    /// Previous relationship of the start node
    pub first_prev_rel: u64,
    /// Next relationship of the start node
    pub first_next_rel: u64,
    /// Previous relationship of the end node
    pub second_prev_rel: u64,
    /// Next relationship of the end node
    pub second_next_rel: u64,
    /// First property, or [`NO_ID`]
    pub next_prop: u64,
}

impl RelationshipRecord {
    /// Unlinked relationship between two nodes
    pub fn new(id: u64, first_node: u64, second_node: u64, rel_type: u32) -> Self {
        Self {
            id,
            in_use: true,
            first_node,
            second_node,
            rel_type,
            first_prev_rel: NO_ID,
            first_next_rel: NO_ID,
            second_prev_rel: NO_ID,
            second_next_rel: NO_ID,
            next_prop: NO_ID,
        }
    }
}

impl Record for RelationshipRecord {
    const RECORD_SIZE: usize = 33;

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn put_fields(&self, buf: &mut BytesMut) -> Result<()> {
        put_pointer(buf, self.first_node)?;
        put_pointer(buf, self.second_node)?;
        buf.put_u32(self.rel_type);
        put_pointer(buf, self.first_prev_rel)?;
        put_pointer(buf, self.first_next_rel)?;
        put_pointer(buf, self.second_prev_rel)?;
        put_pointer(buf, self.second_next_rel)?;
        put_pointer(buf, self.next_prop)
    }

    fn get_fields(id: u64, buf: &mut &[u8]) -> Self {
        Self {
            id,
            in_use: true,
            first_node: get_pointer(buf),
            second_node: get_pointer(buf),
            rel_type: buf.get_u32(),
            first_prev_rel: get_pointer(buf),
            first_next_rel: get_pointer(buf),
            second_prev_rel: get_pointer(buf),
            second_next_rel: get_pointer(buf),
            next_prop: get_pointer(buf),
        }
    }
}

/// Store of [`RelationshipRecord`]s
#[derive(Debug)]
pub struct RelationshipStore {
    store: RecordStore,
}

impl RelationshipStore {
    /// File format of the relationship store
    pub fn format() -> StoreFormat {
        StoreFormat::new(RELATIONSHIP_STORE_DESCRIPTOR, RelationshipRecord::RECORD_SIZE)
            .with_legacy("RelationshipStore v0.9")
    }

    /// Create an empty relationship store
    pub fn create(path: &Path) -> Result<()> {
        RecordStore::create(path, &Self::format())
    }

    /// Open a relationship store
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            store: RecordStore::open(path, Self::format(), config)?,
        })
    }

    /// The underlying record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Allocate a relationship id
    pub fn next_id(&self) -> Result<u64> {
        self.store.next_id()
    }

    /// Read relationship `id`
    pub fn get_record(&self, id: u64, owner: OwnerToken) -> Result<RelationshipRecord> {
        load_record(&self.store, id, owner)
    }

    /// Write a relationship, or delete it when it is not in use
    pub fn update_record(&self, record: &RelationshipRecord, owner: OwnerToken) -> Result<()> {
        save_record(&self.store, record, owner)
    }

    /// Close the store
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}
