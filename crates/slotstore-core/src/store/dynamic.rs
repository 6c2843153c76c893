//! Dynamic store - values longer than a slot, kept as chains of blocks
//!
//! Each slot is a 13-byte block header followed by `block_size` data bytes:
//!
//! ```text
//! [in_use u8][prev u32][length u32][next u32][data; block_size]
//! ```
//!
//! A value is encoded with [`StorableValue::encode`], cut into `block_size`
//! chunks and linked head to tail; the tail's `next` is [`NO_NEXT_BLOCK`].
//! Slot 0 is reserved and stores the block size, so a store can be reopened
//! without being told its geometry.

use crate::config::StoreConfig;
use crate::id_allocator::NO_ID;
use crate::store::record_store::{IN_USE, RecordStore, StoreFormat};
use crate::store::value::StorableValue;
use crate::window::OwnerToken;
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Bytes in front of the data of every block
pub const BLOCK_HEADER_SIZE: usize = 13;

/// `next_block` of the last block in a chain
pub const NO_NEXT_BLOCK: u64 = NO_ID;

/// `prev_block` of the first block in a chain
pub const NO_PREV_BLOCK: u64 = NO_ID;

/// One block of a chain
///
/// A "light" record carries only its header; [`DynamicStore::make_heavy`]
/// pages the data in later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRecord {
    /// Slot id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Previous block, [`NO_PREV_BLOCK`] for the head
    pub prev_block: u64,
    /// Next block, [`NO_NEXT_BLOCK`] for the tail
    pub next_block: u64,
    /// Data bytes in this block
    pub length: usize,
    data: Option<Vec<u8>>,
    /// Allocated in this session and never written
    pub created: bool,
}

impl DynamicRecord {
    /// Empty, unlinked block
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            prev_block: NO_PREV_BLOCK,
            next_block: NO_NEXT_BLOCK,
            length: 0,
            data: Some(Vec::new()),
            created: false,
        }
    }

    /// True when the data has not been read
    pub fn is_light(&self) -> bool {
        self.data.is_none()
    }

    /// Block data, None while light
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Replace the data and its length
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.length = data.len();
        self.data = Some(data);
    }

    /// True for the last block of a chain
    pub fn is_tail(&self) -> bool {
        self.next_block == NO_NEXT_BLOCK
    }
}

/// Store of chained blocks for strings, arrays and names
#[derive(Debug)]
pub struct DynamicStore {
    store: RecordStore,
    block_size: usize,
}

impl DynamicStore {
    fn format(type_descriptor: &str, block_size: usize) -> StoreFormat {
        let mut header = BytesMut::zeroed(BLOCK_HEADER_SIZE + block_size);
        header[0] = IN_USE;
        (&mut header[1..5]).put_u32(block_size as u32);
        StoreFormat::new(type_descriptor, BLOCK_HEADER_SIZE + block_size).with_header(header.to_vec())
    }

    /// Create an empty dynamic store with `block_size` data bytes per block
    pub fn create(path: &Path, type_descriptor: &str, block_size: usize) -> Result<()> {
        if block_size == 0 || block_size > u32::MAX as usize {
            return Err(Error::invalid_argument(format!(
                "block size {} out of range",
                block_size
            )));
        }
        RecordStore::create(path, &Self::format(type_descriptor, block_size))?;
        debug!("Created dynamic store {} (block size {})", path.display(), block_size);
        Ok(())
    }

    /// Open a dynamic store, reading its block size from slot 0
    pub fn open(path: &Path, type_descriptor: &str, config: &StoreConfig) -> Result<Self> {
        let block_size = read_block_size(path)?;
        let store = RecordStore::open(path, Self::format(type_descriptor, block_size), config)?;
        Ok(Self { store, block_size })
    }

    /// The underlying fixed record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Data bytes per block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Allocate the id of a chain head
    pub fn next_block_id(&self) -> Result<u64> {
        self.store.next_id()
    }

    /// Split `value` into linked blocks, the first one at `start_id`
    ///
    /// The blocks are returned unwritten; hand each to
    /// [`update_record`](Self::update_record).
    pub fn allocate_records(
        &self,
        start_id: u64,
        value: &StorableValue,
    ) -> Result<Vec<DynamicRecord>> {
        let blob = value.encode()?;
        let mut records: Vec<DynamicRecord> = Vec::new();
        for (i, chunk) in blob.chunks(self.block_size).enumerate() {
            let id = if i == 0 { start_id } else { self.store.next_id()? };
            let mut record = DynamicRecord::new(id);
            record.in_use = true;
            record.created = true;
            record.set_data(chunk.to_vec());
            if let Some(prev) = records.last_mut() {
                prev.next_block = id;
                record.prev_block = prev.id;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Allocate, link and write `value`; returns the head id
    pub fn store_value(&self, value: &StorableValue, owner: OwnerToken) -> Result<u64> {
        let head = self.next_block_id()?;
        for record in self.allocate_records(head, value)? {
            self.update_record(&record, owner)?;
        }
        Ok(head)
    }

    /// Write an in-use block, or clear a block that is no longer in use and free its id
    pub fn update_record(&self, record: &DynamicRecord, owner: OwnerToken) -> Result<()> {
        if record.id == 0 {
            return Err(Error::invalid_argument("block 0 holds the store header"));
        }
        let mut slot = BytesMut::with_capacity(self.store.record_size());
        if record.in_use {
            let data = record.data().ok_or_else(|| {
                Error::invalid_argument(format!("block {} is light, make it heavy first", record.id))
            })?;
            if data.len() > self.block_size {
                return Err(Error::invalid_argument(format!(
                    "{} bytes do not fit a {}-byte block",
                    data.len(),
                    self.block_size
                )));
            }
            slot.put_u8(IN_USE);
            slot.put_u32(pointer(record.prev_block)?);
            slot.put_u32(data.len() as u32);
            slot.put_u32(pointer(record.next_block)?);
            slot.put_slice(data);
        }
        slot.resize(self.store.record_size(), 0);
        self.store.write_slot(record.id, &slot, owner)?;

        if !record.in_use {
            self.store.free_id(record.id)?;
        }
        Ok(())
    }

    fn read_block(&self, id: u64, heavy: bool, owner: OwnerToken) -> Result<DynamicRecord> {
        if id == 0 {
            return Err(Error::invalid_argument("block 0 holds the store header"));
        }
        let slot = self.store.read_slot(id, owner)?;
        if !StoreFormat::is_in_use(&slot) {
            return Err(Error::NotInUse {
                store: self.store.name().to_string(),
                id,
            });
        }
        let mut header = &slot[1..BLOCK_HEADER_SIZE];
        let prev_block = from_pointer(header.get_u32());
        let length = header.get_u32() as usize;
        let next_block = from_pointer(header.get_u32());
        if length > self.block_size {
            return Err(Error::format(format!(
                "block {} in {} claims {} bytes, block size is {}",
                id,
                self.store.name(),
                length,
                self.block_size
            )));
        }

        let data = heavy.then(|| slot[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + length].to_vec());
        Ok(DynamicRecord {
            id,
            in_use: true,
            prev_block,
            next_block,
            length,
            data,
            created: false,
        })
    }

    /// Read one block with its data
    pub fn get_record(&self, id: u64, owner: OwnerToken) -> Result<DynamicRecord> {
        self.read_block(id, true, owner)
    }

    fn walk(&self, head: u64, heavy: bool, owner: OwnerToken) -> Result<Vec<DynamicRecord>> {
        let limit = self.store.high_id()?;
        let mut records = Vec::new();
        let mut next = head;
        while next != NO_NEXT_BLOCK {
            if records.len() as u64 >= limit {
                return Err(Error::format(format!(
                    "chain from {} in {} does not terminate",
                    head,
                    self.store.name()
                )));
            }
            let record = self.read_block(next, heavy, owner)?;
            next = record.next_block;
            records.push(record);
        }
        Ok(records)
    }

    /// Headers of every block of the chain starting at `head`, without data
    pub fn get_light_records(&self, head: u64, owner: OwnerToken) -> Result<Vec<DynamicRecord>> {
        self.walk(head, false, owner)
    }

    /// Page in the data of a light record
    pub fn make_heavy(&self, record: &mut DynamicRecord, owner: OwnerToken) -> Result<()> {
        if record.is_light() {
            let heavy = self.read_block(record.id, true, owner)?;
            record.data = heavy.data;
            record.length = heavy.length;
        }
        Ok(())
    }

    /// Every block of the chain starting at `head`, with data
    pub fn get_records(&self, head: u64, owner: OwnerToken) -> Result<Vec<DynamicRecord>> {
        self.walk(head, true, owner)
    }

    /// Return one block id to the allocator
    pub fn free_block_id(&self, id: u64) -> Result<()> {
        if id == 0 {
            return Err(Error::invalid_argument("block 0 holds the store header"));
        }
        self.store.free_id(id)
    }

    /// Clear and free every block of the chain starting at `head`
    pub fn free_chain(&self, head: u64, owner: OwnerToken) -> Result<usize> {
        let records = self.get_light_records(head, owner)?;
        for record in &records {
            let mut cleared = DynamicRecord::new(record.id);
            cleared.in_use = false;
            self.update_record(&cleared, owner)?;
        }
        Ok(records.len())
    }

    /// Decode the value held by a heavy chain
    pub fn get_value(&self, records: &[DynamicRecord]) -> Result<StorableValue> {
        let mut blob = Vec::with_capacity(records.iter().map(|r| r.length).sum());
        for record in records {
            let data = record.data().ok_or_else(|| {
                Error::invalid_argument(format!("block {} is light", record.id))
            })?;
            blob.extend_from_slice(data);
        }
        StorableValue::decode(&blob)
    }

    /// Decode the array stored at `head`
    pub fn get_array(&self, head: u64, owner: OwnerToken) -> Result<StorableValue> {
        let value = self.get_value(&self.get_records(head, owner)?)?;
        if !value.is_array() {
            return Err(Error::format(format!(
                "chain {} in {} holds a {}, not an array",
                head,
                self.store.name(),
                value.type_name()
            )));
        }
        Ok(value)
    }

    /// Decode the string stored at `head`
    pub fn get_string_for(&self, head: u64, owner: OwnerToken) -> Result<String> {
        match self.get_value(&self.get_records(head, owner)?)? {
            StorableValue::String(s) => Ok(s),
            other => Err(Error::format(format!(
                "chain {} in {} holds a {}, not a string",
                head,
                self.store.name(),
                other.type_name()
            ))),
        }
    }

    /// Close the underlying store
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

fn pointer(id: u64) -> Result<u32> {
    u32::try_from(id).map_err(|_| Error::invalid_argument(format!("block pointer {} exceeds u32", id)))
}

fn from_pointer(raw: u32) -> u64 {
    raw as u64
}

fn read_block_size(path: &Path) -> Result<usize> {
    let name = crate::store::file::store_name(path);
    let mut file = File::open(path).map_err(|e| Error::io(&name, 0, e))?;
    let mut head = [0u8; 5];
    file.read_exact(&mut head)
        .map_err(|e| Error::io(&name, 0, e))?;
    let block_size = (&head[1..]).get_u32() as usize;
    if head[0] & IN_USE == 0 || block_size == 0 {
        return Err(Error::format(format!("{} has no block size header", name)));
    }
    Ok(block_size)
}
