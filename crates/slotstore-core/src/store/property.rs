//! Property store, 25-byte records
//!
//! ```text
//! [in_use][type u32][key_index u32][prop_block u64][prev_prop u32][next_prop u32]
//! ```
//!
//! `type` is the [`StorableValue`] tag. Scalars live inline in `prop_block`;
//! strings go to the string store and arrays (and raw bytes) to the array
//! store, with `prop_block` holding the head block id. Reading is lazy:
//! [`PropertyStore::get_light_record`] leaves the value chain unread until
//! [`PropertyStore::make_heavy`].

use super::{Record, get_pointer, load_record, put_pointer, save_record};
use crate::config::StoreConfig;
use crate::id_allocator::NO_ID;
use crate::store::dynamic::{DynamicRecord, DynamicStore};
use crate::store::record_store::{RecordStore, StoreFormat};
use crate::store::value::{StorableValue, TagKind, tag_kind};
use crate::window::OwnerToken;
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::path::{Path, PathBuf};

/// Descriptor written at the end of the property store
pub const PROPERTY_STORE_DESCRIPTOR: &str = "PropertyStore v1.0";

/// Descriptor of the property string store
pub const STRING_STORE_DESCRIPTOR: &str = "StringPropertyStore v1.0";

/// Descriptor of the property array store
pub const ARRAY_STORE_DESCRIPTOR: &str = "ArrayPropertyStore v1.0";

/// Where a property value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueHome {
    Inline,
    Strings,
    Arrays,
}

fn home_of(tag: u8) -> ValueHome {
    match tag_kind(tag) {
        TagKind::String => ValueHome::Strings,
        TagKind::Bytes | TagKind::Array => ValueHome::Arrays,
        TagKind::Scalar(_) | TagKind::Unknown => ValueHome::Inline,
    }
}

/// Property record
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    /// Property id
    pub id: u64,
    /// In-use flag
    pub in_use: bool,
    /// Value tag
    pub prop_type: u32,
    /// Property key id
    pub key_index: u32,
    /// Inline scalar bits, or head block of the value chain
    pub prop_block: u64,
    /// Previous property in the owner's chain
    pub prev_prop: u64,
    /// Next property in the owner's chain
    pub next_prop: u64,
    /// Value chain blocks; empty for inline values and for light records
    pub value_records: Vec<DynamicRecord>,
    /// True once `value_records` holds the chain with data
    pub heavy: bool,
}

impl PropertyRecord {
    /// Unlinked in-use property with no value yet
    pub fn new(id: u64, key_index: u32) -> Self {
        Self {
            id,
            in_use: true,
            prop_type: 0,
            key_index,
            prop_block: 0,
            prev_prop: NO_ID,
            next_prop: NO_ID,
            value_records: Vec::new(),
            heavy: true,
        }
    }

    fn home(&self) -> ValueHome {
        home_of(self.prop_type as u8)
    }
}

impl Record for PropertyRecord {
    const RECORD_SIZE: usize = 25;

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }

    fn put_fields(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.prop_type);
        buf.put_u32(self.key_index);
        buf.put_u64(self.prop_block);
        put_pointer(buf, self.prev_prop)?;
        put_pointer(buf, self.next_prop)
    }

    fn get_fields(id: u64, buf: &mut &[u8]) -> Self {
        let prop_type = buf.get_u32();
        let key_index = buf.get_u32();
        let prop_block = buf.get_u64();
        let prev_prop = get_pointer(buf);
        let next_prop = get_pointer(buf);
        let mut record = Self {
            id,
            in_use: true,
            prop_type,
            key_index,
            prop_block,
            prev_prop,
            next_prop,
            value_records: Vec::new(),
            heavy: false,
        };
        record.heavy = record.home() == ValueHome::Inline;
        record
    }
}

fn inline_bits(value: &StorableValue) -> Option<u64> {
    let bits = match value {
        StorableValue::Bool(v) => *v as u64,
        StorableValue::Byte(v) => *v as u8 as u64,
        StorableValue::Short(v) => *v as u16 as u64,
        StorableValue::Char(v) => *v as u32 as u64,
        StorableValue::Int(v) => *v as u32 as u64,
        StorableValue::Long(v) => *v as u64,
        StorableValue::Float(v) => v.to_bits() as u64,
        StorableValue::Double(v) => v.to_bits(),
        _ => return None,
    };
    Some(bits)
}

/// Decode an inline scalar through its big-endian blob form
fn from_inline(tag: u8, bits: u64) -> Result<StorableValue> {
    let TagKind::Scalar(width) = tag_kind(tag) else {
        return Err(Error::format(format!(
            "property type 0x{:02x} is not an inline scalar",
            tag
        )));
    };
    StorableValue::decode(&blob(tag, bits, width))
}

fn blob(tag: u8, bits: u64, width: usize) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&bits.to_be_bytes()[8 - width..]);
    out
}

/// Property store with its string and array stores
#[derive(Debug)]
pub struct PropertyStore {
    store: RecordStore,
    strings: DynamicStore,
    arrays: DynamicStore,
}

impl PropertyStore {
    /// File format of the property store
    pub fn format() -> StoreFormat {
        StoreFormat::new(PROPERTY_STORE_DESCRIPTOR, PropertyRecord::RECORD_SIZE)
    }

    /// `<path>.strings`
    pub fn strings_path(path: &Path) -> PathBuf {
        with_suffix(path, ".strings")
    }

    /// `<path>.arrays`
    pub fn arrays_path(path: &Path) -> PathBuf {
        with_suffix(path, ".arrays")
    }

    /// Create the property store and both value stores
    pub fn create(path: &Path, string_block_size: usize, array_block_size: usize) -> Result<()> {
        RecordStore::create(path, &Self::format())?;
        DynamicStore::create(
            &Self::strings_path(path),
            STRING_STORE_DESCRIPTOR,
            string_block_size,
        )?;
        DynamicStore::create(
            &Self::arrays_path(path),
            ARRAY_STORE_DESCRIPTOR,
            array_block_size,
        )
    }

    /// Open the property store and both value stores
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        let store = RecordStore::open(path, Self::format(), config)?;
        let strings = DynamicStore::open(&Self::strings_path(path), STRING_STORE_DESCRIPTOR, config)?;
        let arrays = DynamicStore::open(&Self::arrays_path(path), ARRAY_STORE_DESCRIPTOR, config)?;
        Ok(Self {
            store,
            strings,
            arrays,
        })
    }

    /// The property record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The string value store
    pub fn strings(&self) -> &DynamicStore {
        &self.strings
    }

    /// The array value store
    pub fn arrays(&self) -> &DynamicStore {
        &self.arrays
    }

    /// Every underlying store, property records first
    pub fn stores(&self) -> [&RecordStore; 3] {
        [&self.store, self.strings.store(), self.arrays.store()]
    }

    fn dynamic_for(&self, home: ValueHome) -> Option<&DynamicStore> {
        match home {
            ValueHome::Inline => None,
            ValueHome::Strings => Some(&self.strings),
            ValueHome::Arrays => Some(&self.arrays),
        }
    }

    /// Allocate a property id
    pub fn next_id(&self) -> Result<u64> {
        self.store.next_id()
    }

    /// Put `value` into `record`: inline for scalars, as new unwritten blocks otherwise
    ///
    /// Blocks of a previous value are not freed here; see [`update_record`](Self::update_record).
    pub fn encode_value(&self, record: &mut PropertyRecord, value: &StorableValue) -> Result<()> {
        record.prop_type = value.tag() as u32;
        record.value_records.clear();
        record.heavy = true;
        if let Some(bits) = inline_bits(value) {
            record.prop_block = bits;
            return Ok(());
        }
        let Some(dynamic) = self.dynamic_for(record.home()) else {
            return Err(Error::format(format!("no store for {}", value.type_name())));
        };
        let head = dynamic.next_block_id()?;
        record.prop_block = head;
        record.value_records = dynamic.allocate_records(head, value)?;
        Ok(())
    }

    /// Write a property with its value blocks, or delete it together with its value chain
    pub fn update_record(&self, record: &PropertyRecord, owner: OwnerToken) -> Result<()> {
        if record.in_use {
            if let Some(dynamic) = self.dynamic_for(record.home()) {
                for block in &record.value_records {
                    if !block.is_light() || !block.in_use {
                        dynamic.update_record(block, owner)?;
                    }
                }
            }
        } else if let Some(dynamic) = self.dynamic_for(record.home()) {
            dynamic.free_chain(record.prop_block, owner)?;
        }
        save_record(&self.store, record, owner)
    }

    /// Read a property without its value chain
    pub fn get_light_record(&self, id: u64, owner: OwnerToken) -> Result<PropertyRecord> {
        load_record(&self.store, id, owner)
    }

    /// Read the value chain of a light record
    pub fn make_heavy(&self, record: &mut PropertyRecord, owner: OwnerToken) -> Result<()> {
        if record.heavy {
            return Ok(());
        }
        if let Some(dynamic) = self.dynamic_for(record.home()) {
            record.value_records = dynamic.get_records(record.prop_block, owner)?;
        }
        record.heavy = true;
        Ok(())
    }

    /// Read a property with its value chain
    pub fn get_record(&self, id: u64, owner: OwnerToken) -> Result<PropertyRecord> {
        let mut record = self.get_light_record(id, owner)?;
        self.make_heavy(&mut record, owner)?;
        Ok(record)
    }

    /// Decode the value of a heavy record
    pub fn get_value(&self, record: &PropertyRecord) -> Result<StorableValue> {
        match self.dynamic_for(record.home()) {
            None => from_inline(record.prop_type as u8, record.prop_block),
            Some(dynamic) => {
                if !record.heavy {
                    return Err(Error::invalid_argument(format!(
                        "property {} is light, make it heavy first",
                        record.id
                    )));
                }
                dynamic.get_value(&record.value_records)
            }
        }
    }

    /// Flush all three stores
    pub fn flush(&self, tx: u64) -> Result<()> {
        self.stores().iter().try_for_each(|s| s.flush(tx))
    }

    /// Close the value stores, then the property records
    pub fn close(&self) -> Result<()> {
        self.strings.close()?;
        self.arrays.close()?;
        self.store.close()
    }
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
