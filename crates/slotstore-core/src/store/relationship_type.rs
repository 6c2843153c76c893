//! Relationship type store: `[in_use][name_block u32]`, 5 bytes, with the
//! names themselves in a dynamic store next to it

use super::{Record, get_pointer, load_record, put_pointer, save_record};
use crate::config::StoreConfig;
use crate::store::dynamic::DynamicStore;
use crate::store::property::with_suffix;
use crate::store::record_store::{RecordStore, StoreFormat};
use crate::store::value::StorableValue;
use crate::window::OwnerToken;
use crate::{Error, Result};
use bytes::BytesMut;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Descriptor written at the end of the relationship type store
pub const RELATIONSHIP_TYPE_STORE_DESCRIPTOR: &str = "RelationshipTypeStore v1.0";

/// Descriptor of the type name store
pub const TYPE_NAME_STORE_DESCRIPTOR: &str = "RelationshipTypeNameStore v1.0";

/// Relationship type record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipTypeRecord {
    /// Type id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Head block of the name in the name store
    pub name_block: u64,
}

impl Record for RelationshipTypeRecord {
    const RECORD_SIZE: usize = 5;

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn put_fields(&self, buf: &mut BytesMut) -> Result<()> {
        put_pointer(buf, self.name_block)
    }

    fn get_fields(id: u64, buf: &mut &[u8]) -> Self {
        Self {
            id,
            in_use: true,
            name_block: get_pointer(buf),
        }
    }
}

/// Relationship types and their names
#[derive(Debug)]
pub struct RelationshipTypeStore {
    store: RecordStore,
    names: DynamicStore,
}

impl RelationshipTypeStore {
    /// File format of the type store
    pub fn format() -> StoreFormat {
        StoreFormat::new(
            RELATIONSHIP_TYPE_STORE_DESCRIPTOR,
            RelationshipTypeRecord::RECORD_SIZE,
        )
    }

    /// `<path>.names`
    pub fn names_path(path: &Path) -> PathBuf {
        with_suffix(path, ".names")
    }

    /// Create the type store and its name store
    pub fn create(path: &Path, name_block_size: usize) -> Result<()> {
        RecordStore::create(path, &Self::format())?;
        DynamicStore::create(
            &Self::names_path(path),
            TYPE_NAME_STORE_DESCRIPTOR,
            name_block_size,
        )
    }

    /// Open the type store and its name store
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            store: RecordStore::open(path, Self::format(), config)?,
            names: DynamicStore::open(&Self::names_path(path), TYPE_NAME_STORE_DESCRIPTOR, config)?,
        })
    }

    /// The type record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The name store
    pub fn names(&self) -> &DynamicStore {
        &self.names
    }

    /// Both underlying stores, type records first
    pub fn stores(&self) -> [&RecordStore; 2] {
        [&self.store, self.names.store()]
    }

    /// Allocate a type id
    pub fn next_id(&self) -> Result<u64> {
        self.store.next_id()
    }

    /// Register a new type called `name`; returns its id
    pub fn add_type(&self, name: &str, owner: OwnerToken) -> Result<u64> {
        if name.is_empty() {
            return Err(Error::invalid_argument("relationship type name is empty"));
        }
        let name_block = self
            .names
            .store_value(&StorableValue::String(name.to_string()), owner)?;
        let id = self.next_id()?;
        let record = RelationshipTypeRecord {
            id,
            in_use: true,
            name_block,
        };
        save_record(&self.store, &record, owner)?;
        debug!("Added relationship type {} = {:?}", id, name);
        Ok(id)
    }

    /// Read type record `id`
    pub fn get_record(&self, id: u64, owner: OwnerToken) -> Result<RelationshipTypeRecord> {
        load_record(&self.store, id, owner)
    }

    /// Write a type record; deleting one also frees its name blocks
    pub fn update_record(&self, record: &RelationshipTypeRecord, owner: OwnerToken) -> Result<()> {
        if !record.in_use {
            let stored = self.get_record(record.id, owner)?;
            self.names.free_chain(stored.name_block, owner)?;
        }
        save_record(&self.store, record, owner)
    }

    /// Name of type `id`
    pub fn get_name(&self, id: u64, owner: OwnerToken) -> Result<String> {
        let record = self.get_record(id, owner)?;
        self.names.get_string_for(record.name_block, owner)
    }

    /// Every type in use, by id
    pub fn all_types(&self, owner: OwnerToken) -> Result<Vec<(u64, String)>> {
        let mut types = Vec::new();
        for id in 0..self.store.high_id()? {
            match self.get_name(id, owner) {
                Ok(name) => types.push((id, name)),
                Err(Error::NotInUse { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(types)
    }

    /// Flush both stores
    pub fn flush(&self, tx: u64) -> Result<()> {
        self.stores().iter().try_for_each(|s| s.flush(tx))
    }

    /// Close the name store, then the type records
    pub fn close(&self) -> Result<()> {
        self.names.close()?;
        self.store.close()
    }
}
