//! Windows - locked in-memory views over consecutive slots of a store file
//!
//! Two kinds of window exist:
//!
//! - **Row** windows cover exactly one record. They are opened on demand,
//!   read the slot from the file when first locked and write it back when
//!   released.
//! - **Brick** windows cover many consecutive records through a memory map.
//!   Writes land in the map and reach the file on [`WindowPool::flush_all`].
//!
//! A window owns its bytes and the id of its first record; every access is
//! a checked `(id - position) * record_size` computation, so touching a
//! record outside the window is an error rather than silent corruption.

mod lock;
mod pool;

pub use lock::{OwnerLock, OwnerToken};
pub use pool::{WindowGuard, WindowPool, WindowPoolStats};

use crate::store::file::StoreFile;
use crate::{Error, Result};
use memmap2::MmapMut;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// What the caller intends to do with an acquired window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Read only
    Read,
    /// Read and write
    Write,
}

/// Window flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Single record, file backed
    Row,
    /// Many records, memory mapped
    Brick,
}

enum WindowBuffer {
    Row { bytes: Vec<u8>, loaded: bool },
    Mapped(MmapMut),
}

/// A lockable view over `[position, position + size)` records
pub struct Window {
    kind: WindowKind,
    position: u64,
    size: u64,
    record_size: usize,
    lock: OwnerLock,
    /// Acquirers that found this window but do not hold its lock yet
    marked: AtomicU32,
    dirty: AtomicBool,
    buffer: Mutex<WindowBuffer>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("record_size", &self.record_size)
            .finish_non_exhaustive()
    }
}

impl Window {
    pub(crate) fn row(position: u64, record_size: usize) -> Self {
        Self {
            kind: WindowKind::Row,
            position,
            size: 1,
            record_size,
            lock: OwnerLock::new(),
            marked: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            buffer: Mutex::new(WindowBuffer::Row {
                bytes: vec![0u8; record_size],
                loaded: false,
            }),
        }
    }

    pub(crate) fn brick(position: u64, record_size: usize, map: MmapMut) -> Self {
        let size = (map.len() / record_size) as u64;
        Self {
            kind: WindowKind::Brick,
            position,
            size,
            record_size,
            lock: OwnerLock::new(),
            marked: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            buffer: Mutex::new(WindowBuffer::Mapped(map)),
        }
    }

    /// Row or brick
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// Id of the first record covered
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of records covered
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes per record
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// True when `id` falls inside this window
    pub fn covers(&self, id: u64) -> bool {
        id >= self.position && id - self.position < self.size
    }

    pub(crate) fn lock(&self) -> &OwnerLock {
        &self.lock
    }

    pub(crate) fn mark(&self) {
        self.marked.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unmark(&self) {
        self.marked.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn is_marked(&self) -> bool {
        self.marked.load(Ordering::Acquire) > 0
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Checked byte range of `len` bytes at `offset` inside record `id`
    fn range(&self, id: u64, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        if !self.covers(id) {
            return Err(Error::invalid_argument(format!(
                "record {} outside window [{}, {})",
                id,
                self.position,
                self.position + self.size
            )));
        }
        if offset.checked_add(len).is_none_or(|end| end > self.record_size) {
            return Err(Error::invalid_argument(format!(
                "{} bytes at offset {} overflow a {}-byte record",
                len, offset, self.record_size
            )));
        }
        let start = (id - self.position) as usize * self.record_size + offset;
        Ok(start..start + len)
    }

    pub(crate) fn read(&self, id: u64, offset: usize, buf: &mut [u8]) -> Result<()> {
        let range = self.range(id, offset, buf.len())?;
        let buffer = self.buffer.lock();
        let bytes: &[u8] = match &*buffer {
            WindowBuffer::Row { bytes, .. } => bytes,
            WindowBuffer::Mapped(map) => map,
        };
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }

    pub(crate) fn write(&self, id: u64, offset: usize, data: &[u8]) -> Result<()> {
        let range = self.range(id, offset, data.len())?;
        let mut buffer = self.buffer.lock();
        let bytes: &mut [u8] = match &mut *buffer {
            WindowBuffer::Row { bytes, .. } => bytes,
            WindowBuffer::Mapped(map) => map,
        };
        bytes[range].copy_from_slice(data);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Fill a row window from the file the first time it is locked
    pub(crate) fn load(&self, file: &StoreFile) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if let WindowBuffer::Row { bytes, loaded } = &mut *buffer {
            if !*loaded {
                file.read_at(self.position * self.record_size as u64, bytes)?;
                *loaded = true;
            }
        }
        Ok(())
    }

    /// Push pending bytes to the file: a positioned write for rows, msync for bricks
    pub(crate) fn force(&self, file: &StoreFile) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let buffer = self.buffer.lock();
        let result = match &*buffer {
            WindowBuffer::Row { bytes, .. } => {
                file.write_at(self.position * self.record_size as u64, bytes)
            }
            WindowBuffer::Mapped(map) => map
                .flush()
                .map_err(|e| Error::io(file.name(), self.position, e)),
        };
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }
}
