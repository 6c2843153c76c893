//! Record stores
//!
//! - [`record_store`]: the fixed-slot file every store is built on
//! - [`dynamic`]: chains of blocks for values longer than one slot
//! - [`value`]: the typed payloads dynamic chains carry
//! - [`node`], [`relationship`], [`property`], [`relationship_type`]: the
//!   graph record layouts
//! - [`set`]: all stores of one database directory, opened together

pub mod dynamic;
pub mod file;
pub mod node;
pub mod property;
pub mod record_store;
pub mod relationship;
pub mod relationship_type;
pub mod set;
pub mod value;

pub use dynamic::{DynamicRecord, DynamicStore, NO_NEXT_BLOCK};
pub use node::{NodeRecord, NodeStore};
pub use property::{PropertyRecord, PropertyStore};
pub use record_store::{RecordStore, StoreFormat, StoreStats};
pub use relationship::{RelationshipRecord, RelationshipStore};
pub use relationship_type::{RelationshipTypeRecord, RelationshipTypeStore};
pub use set::GraphStores;
pub use value::StorableValue;

use crate::id_allocator::NO_ID;
use crate::window::{OpType, OwnerToken};
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use record_store::IN_USE;

/// A fixed-layout record: in-use flag byte, then big-endian fields
pub trait Record: Sized {
    /// Slot size including the flag byte
    const RECORD_SIZE: usize;

    /// Record id
    fn id(&self) -> u64;

    /// In-use flag
    fn in_use(&self) -> bool;

    /// Append the fields that follow the flag byte
    fn put_fields(&self, buf: &mut BytesMut) -> Result<()>;

    /// Read the fields that follow the flag byte of an in-use slot
    fn get_fields(id: u64, buf: &mut &[u8]) -> Self;
}

/// Read record `id`, failing with [`Error::NotInUse`] for a free slot
pub fn load_record<R: Record>(store: &RecordStore, id: u64, owner: OwnerToken) -> Result<R> {
    let guard = store.acquire_window(id, OpType::Read, owner)?;
    let slot = guard.read_record(id)?;
    store.release_window(guard)?;

    if !StoreFormat::is_in_use(&slot) {
        return Err(Error::NotInUse {
            store: store.name().to_string(),
            id,
        });
    }
    let mut fields = &slot[1..];
    Ok(R::get_fields(id, &mut fields))
}

/// Write an in-use record, or clear a free one and return its id
pub fn save_record<R: Record>(store: &RecordStore, record: &R, owner: OwnerToken) -> Result<()> {
    let mut slot = BytesMut::with_capacity(R::RECORD_SIZE);
    if record.in_use() {
        slot.put_u8(IN_USE);
        record.put_fields(&mut slot)?;
        if slot.len() != R::RECORD_SIZE {
            return Err(Error::format(format!(
                "record {} encoded to {} bytes, slot is {}",
                record.id(),
                slot.len(),
                R::RECORD_SIZE
            )));
        }
    } else {
        slot.resize(R::RECORD_SIZE, 0);
    }
    store.write_slot(record.id(), &slot, owner)?;

    if !record.in_use() {
        store.free_id(record.id())?;
    }
    Ok(())
}

/// Encode a record pointer as the 4-byte on-disk form
pub(crate) fn put_pointer(buf: &mut BytesMut, id: u64) -> Result<()> {
    let raw = u32::try_from(id)
        .map_err(|_| Error::invalid_argument(format!("pointer {} exceeds u32", id)))?;
    buf.put_u32(raw);
    Ok(())
}

/// Decode a 4-byte pointer; `0xFFFF_FFFF` reads back as [`NO_ID`]
pub(crate) fn get_pointer(buf: &mut &[u8]) -> u64 {
    let raw = buf.get_u32() as u64;
    debug_assert!(raw <= NO_ID);
    raw
}
