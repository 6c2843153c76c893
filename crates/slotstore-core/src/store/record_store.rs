//! Fixed record store - one file of equal-size slots plus a type descriptor
//!
//! ```text
//! [slot 0][slot 1]...[slot N-1]["NodeStore v1.0"]
//! ```
//!
//! While open the descriptor is cut off so the file is a plain slot array;
//! close writes it back at `high_id * record_size`. A store whose descriptor
//! is missing, whose length is not a whole number of slots, or whose id file
//! was left sticky opens "not ok" and refuses everything except
//! [`RecordStore::make_store_ok`] and [`RecordStore::validate`].
//!
//! Dropping a store without [`RecordStore::close`] leaves the id file sticky,
//! exactly like a crash would.

use crate::config::StoreConfig;
use crate::id_allocator::{IdAllocator, RebuildReport};
use crate::store::file::{StoreFile, store_name};
use crate::window::{OpType, OwnerToken, WindowGuard, WindowPool, WindowPoolStats};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Bit 0 of the first slot byte
pub const IN_USE: u8 = 0x1;

/// Slots read per chunk while rebuilding the id file
const SCAN_CHUNK_SLOTS: u64 = 4096;

/// Static description of a store file: record size, descriptor, header slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFormat {
    type_descriptor: String,
    record_size: usize,
    legacy_descriptors: Vec<String>,
    header: Vec<u8>,
}

impl StoreFormat {
    /// Format with the given trailing descriptor and slot size
    pub fn new(type_descriptor: impl Into<String>, record_size: usize) -> Self {
        Self {
            type_descriptor: type_descriptor.into(),
            record_size,
            legacy_descriptors: Vec::new(),
            header: Vec::new(),
        }
    }

    /// Older descriptors with an identical slot layout, accepted and upgraded at open
    pub fn with_legacy(mut self, descriptor: impl Into<String>) -> Self {
        self.legacy_descriptors.push(descriptor.into());
        self
    }

    /// Reserved slots written by [`RecordStore::create`]; their ids are never handed out
    pub fn with_header(mut self, header: Vec<u8>) -> Self {
        self.header = header;
        self
    }

    /// Descriptor string
    pub fn type_descriptor(&self) -> &str {
        &self.type_descriptor
    }

    /// Slot size in bytes (0 for container files)
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of reserved header slots
    pub fn header_slots(&self) -> u64 {
        if self.record_size == 0 {
            0
        } else {
            (self.header.len() / self.record_size) as u64
        }
    }

    /// In-use flag of a raw slot
    pub fn is_in_use(slot: &[u8]) -> bool {
        slot.first().is_some_and(|b| b & IN_USE != 0)
    }
}

/// Diagnostics for one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Store file name
    pub name: String,
    /// Slot size
    pub record_size: usize,
    /// Allocation frontier, None when the id file could not be opened
    pub high_id: Option<u64>,
    /// Ids available for reuse
    pub free_ids: Option<u64>,
    /// Current file length in bytes
    pub file_size: u64,
    /// False until `make_store_ok` ran on a store that opened dirty
    pub store_ok: bool,
    /// Window pool counters
    pub windows: Option<WindowPoolStats>,
}

/// One open store file with its id allocator and window pool
pub struct RecordStore {
    path: PathBuf,
    name: String,
    format: StoreFormat,
    grab_size: usize,
    file: Arc<StoreFile>,
    ids: RwLock<Option<IdAllocator>>,
    pool: Option<WindowPool>,
    /// Byte range of a partial trailing slot found at open
    torn_tail: Mutex<Option<(u64, u64)>>,
    store_ok: AtomicBool,
    recovery: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("record_size", &self.format.record_size)
            .field("store_ok", &self.store_ok.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Companion id file of a store: `<store>.id`
pub fn id_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".id");
    PathBuf::from(name)
}

impl RecordStore {
    /// Create an empty store file and its clean id file
    ///
    /// Fails with [`Error::AlreadyExists`] when the path exists and with
    /// [`Error::InvalidArgument`] when the file name is empty.
    pub fn create(path: &Path, format: &StoreFormat) -> Result<()> {
        let has_name = path
            .file_name()
            .is_some_and(|n| !n.to_string_lossy().trim().is_empty());
        if !has_name {
            return Err(Error::invalid_argument(format!(
                "store path {} has no file name",
                path.display()
            )));
        }
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        if format.record_size > 0 && format.header.len() % format.record_size != 0 {
            return Err(Error::invalid_argument(format!(
                "header of {} bytes is not a whole number of {}-byte slots",
                format.header.len(),
                format.record_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::io(store_name(path), 0, e))?;
        drop(file);
        let file = StoreFile::open(path)?;
        file.write_at(0, &format.header)?;
        file.write_at(format.header.len() as u64, format.type_descriptor.as_bytes())?;
        file.sync()?;
        file.unlock()?;

        if format.record_size > 0 {
            IdAllocator::create(&id_file_path(path), format.header_slots())?;
        }
        debug!("Created store {} ({})", path.display(), format.type_descriptor);
        Ok(())
    }

    /// Open a store, marking it "not ok" instead of failing when it was not
    /// closed cleanly
    pub fn open(path: &Path, format: StoreFormat, config: &StoreConfig) -> Result<Self> {
        let file = StoreFile::open(path)?;
        let name = file.name().to_string();
        let mut store_ok = true;
        let mut torn_tail = None;

        let file_size = file.len()?;
        let live = match trailer_length(&file, file_size, &format)? {
            Some(len) => file_size - len,
            None => {
                warn!(
                    "{}: expected descriptor {:?} not found, store is not ok",
                    name, format.type_descriptor
                );
                store_ok = false;
                file_size
            }
        };
        if format.record_size > 0 && live % format.record_size as u64 != 0 {
            warn!(
                "{}: {} bytes is not a whole number of {}-byte slots, store is not ok",
                name, live, format.record_size
            );
            store_ok = false;
            torn_tail = Some((live - live % format.record_size as u64, live));
        }
        file.set_len(live)?;

        let ids = if format.record_size == 0 {
            None
        } else {
            match IdAllocator::open(&id_file_path(path), config.grab_size) {
                Ok(ids) => Some(ids),
                Err(e) if e.requires_rebuild() => {
                    warn!("{}: {}, store is not ok", name, e);
                    store_ok = false;
                    None
                }
                Err(e) => return Err(e),
            }
        };

        let file = Arc::new(file);
        let pool = if format.record_size == 0 {
            None
        } else {
            Some(WindowPool::new(
                file.clone(),
                format.record_size,
                config.mapped_memory_for(&name),
                config.bricks.clone(),
            )?)
        };

        debug!("Opened store {} (ok={})", name, store_ok);
        Ok(Self {
            path: path.to_path_buf(),
            name,
            format,
            grab_size: config.grab_size,
            file,
            ids: RwLock::new(ids),
            pool,
            torn_tail: Mutex::new(torn_tail),
            store_ok: AtomicBool::new(store_ok),
            recovery: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Store file name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Slot size in bytes
    pub fn record_size(&self) -> usize {
        self.format.record_size
    }

    /// Descriptor written on close
    pub fn type_descriptor(&self) -> &str {
        &self.format.type_descriptor
    }

    /// False while the store needs [`make_store_ok`](Self::make_store_ok)
    pub fn is_store_ok(&self) -> bool {
        self.store_ok.load(Ordering::Acquire)
    }

    /// Let window access proceed on a not-ok store and past the high id
    pub fn set_recovery_mode(&self, recovery: bool) {
        self.recovery.store(recovery, Ordering::Release);
    }

    /// True while recovery mode is on
    pub fn is_recovery_mode(&self) -> bool {
        self.recovery.load(Ordering::Acquire)
    }

    /// Fail with [`Error::StoreNotValid`] unless the store is ok
    pub fn validate(&self) -> Result<()> {
        if !self.is_store_ok() {
            return Err(Error::StoreNotValid(self.name.clone()));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::storage(format!("store {} is closed", self.name)));
        }
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        self.ensure_open()?;
        self.validate()
    }

    fn with_ids<T>(&self, f: impl FnOnce(&IdAllocator) -> Result<T>) -> Result<T> {
        let ids = self.ids.read();
        match ids.as_ref() {
            Some(ids) => f(ids),
            None if self.format.record_size == 0 => Err(Error::invalid_argument(format!(
                "{} is a container store without records",
                self.name
            ))),
            None => Err(Error::StoreNotValid(self.name.clone())),
        }
    }

    fn pool(&self) -> Result<&WindowPool> {
        self.pool.as_ref().ok_or_else(|| {
            Error::invalid_argument(format!("{} is a container store without records", self.name))
        })
    }

    /// Lock the window holding record `id`
    ///
    /// Ids at or past the high id fail with [`Error::OutOfRange`] unless the
    /// store is in recovery mode, where a write moves the high id past `id`.
    pub fn acquire_window(
        &self,
        id: u64,
        op: OpType,
        owner: OwnerToken,
    ) -> Result<WindowGuard<'_>> {
        self.ensure_open()?;
        let recovery = self.is_recovery_mode();
        if !recovery {
            self.validate()?;
        }

        let high_id = self.ids.read().as_ref().map(|ids| ids.high_id()).transpose()?;
        match high_id {
            Some(high_id) if id >= high_id => {
                if !recovery {
                    return Err(Error::OutOfRange {
                        store: self.name.clone(),
                        position: id,
                        high_id,
                    });
                }
                if op == OpType::Write {
                    self.with_ids(|ids| ids.raise_high_id(id + 1))?;
                }
            }
            None if !recovery => return Err(Error::StoreNotValid(self.name.clone())),
            _ => {}
        }

        self.pool()?.acquire(id, op, owner)
    }

    /// Release a window acquired from this store
    pub fn release_window(&self, mut guard: WindowGuard<'_>) -> Result<()> {
        guard.release()
    }

    /// Read the raw slot of `id`
    pub fn read_slot(&self, id: u64, owner: OwnerToken) -> Result<Vec<u8>> {
        let guard = self.acquire_window(id, OpType::Read, owner)?;
        let bytes = guard.read_record(id)?;
        self.release_window(guard)?;
        Ok(bytes)
    }

    /// Overwrite the raw slot of `id`
    pub fn write_slot(&self, id: u64, data: &[u8], owner: OwnerToken) -> Result<()> {
        let guard = self.acquire_window(id, OpType::Write, owner)?;
        guard.write_record(id, data)?;
        self.release_window(guard)
    }

    /// Allocate an id
    pub fn next_id(&self) -> Result<u64> {
        self.ensure_usable()?;
        self.with_ids(|ids| ids.next_id())
    }

    /// Return `id` for reuse
    pub fn free_id(&self, id: u64) -> Result<()> {
        self.ensure_usable()?;
        self.with_ids(|ids| ids.free_id(id))
    }

    /// Allocation frontier
    pub fn high_id(&self) -> Result<u64> {
        self.ensure_usable()?;
        self.with_ids(|ids| ids.high_id())
    }

    /// Move the allocation frontier
    pub fn set_high_id(&self, high_id: u64) -> Result<()> {
        self.ensure_usable()?;
        self.with_ids(|ids| ids.set_high_id(high_id))
    }

    /// Largest id that may hold a record
    pub fn highest_possible_id_in_use(&self) -> Result<Option<u64>> {
        Ok(self.high_id()?.checked_sub(1))
    }

    /// Ids available for reuse
    pub fn free_id_count(&self) -> Result<u64> {
        self.ensure_usable()?;
        self.with_ids(|ids| ids.free_id_count())
    }

    /// Current length of the store file
    pub fn file_size(&self) -> Result<u64> {
        self.file.len()
    }

    /// Make every write so far durable. `tx` only tags the log line.
    pub fn flush(&self, tx: u64) -> Result<()> {
        self.ensure_open()?;
        match &self.pool {
            Some(pool) => pool.flush_all()?,
            None => self.file.sync()?,
        }
        debug!("{}: flushed for transaction {}", self.name, tx);
        Ok(())
    }

    /// Drop whatever the store keeps for transaction `tx`
    ///
    /// Windows hold no per-transaction state, so there is nothing to discard.
    pub fn forget(&self, tx: u64) {
        debug!("{}: forget transaction {}", self.name, tx);
    }

    /// Rebuild the id file from a full slot scan and mark the store ok
    pub fn make_store_ok(&self) -> Result<Option<RebuildReport>> {
        self.ensure_open()?;
        if self.is_store_ok() {
            return Ok(None);
        }
        if self.format.record_size == 0 {
            self.store_ok.store(true, Ordering::Release);
            return Ok(None);
        }

        let pool = self.pool()?;
        pool.flush_all()?;
        pool.unmap_all()?;

        if let Some((start, end)) = self.torn_tail.lock().take() {
            warn!(
                "{}: dropping {} bytes of a torn trailing slot",
                self.name,
                end - start
            );
            self.file.write_at(start, &vec![0u8; (end - start) as usize])?;
        }

        let mut ids = self.ids.write();
        // The stale handle must not compact over the rebuilt file
        drop(ids.take());

        let slots = self.file.len()?.div_ceil(self.format.record_size as u64);
        let scan = SlotScan::new(&self.file, self.format.record_size, slots);
        let (rebuilt, mut report) =
            IdAllocator::rebuild(&id_file_path(&self.path), self.grab_size, scan)?;
        let header_slots = self.format.header_slots();
        if rebuilt.high_id()? < header_slots {
            rebuilt.set_high_id(header_slots)?;
            report.high_id = header_slots;
        }
        *ids = Some(rebuilt);
        self.store_ok.store(true, Ordering::Release);

        info!(
            "{}: store rebuilt, high id {} with {} free ids from {} slots",
            self.name, report.high_id, report.defragged, report.scanned
        );
        Ok(Some(report))
    }

    /// Diagnostics snapshot
    pub fn stats(&self) -> Result<StoreStats> {
        let ids = self.ids.read();
        Ok(StoreStats {
            name: self.name.clone(),
            record_size: self.format.record_size,
            high_id: ids.as_ref().map(|i| i.high_id()).transpose()?,
            free_ids: ids.as_ref().map(|i| i.free_id_count()).transpose()?,
            file_size: self.file.len()?,
            store_ok: self.is_store_ok(),
            windows: self.pool.as_ref().map(|p| p.stats()),
        })
    }

    /// Flush, close the allocator, append the descriptor and release the file lock
    ///
    /// A store that is still not ok keeps its id file sticky so the next
    /// open rebuilds again. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(pool) = &self.pool {
            pool.close()?;
        }

        let store_ok = self.is_store_ok();
        let ids = self.ids.write().take();
        let end = match ids {
            Some(ids) if store_ok => {
                let high_id = ids.high_id()?;
                ids.close()?;
                high_id * self.format.record_size as u64
            }
            _ => self.file.len()?,
        };

        self.file.set_len(end)?;
        self.file
            .write_at(end, self.format.type_descriptor.as_bytes())?;
        self.file.sync()?;
        self.file.unlock()?;
        debug!("Closed store {} (ok={})", self.name, store_ok);
        Ok(())
    }
}

/// Length of the recognised descriptor at the end of the file, if any
fn trailer_length(file: &StoreFile, file_size: u64, format: &StoreFormat) -> Result<Option<u64>> {
    let current = std::iter::once(&format.type_descriptor);
    for (i, descriptor) in current.chain(format.legacy_descriptors.iter()).enumerate() {
        let len = descriptor.len() as u64;
        if file_size < len {
            continue;
        }
        let mut tail = vec![0u8; descriptor.len()];
        file.read_at(file_size - len, &mut tail)?;
        if tail == descriptor.as_bytes() {
            if i > 0 {
                info!(
                    "{}: upgrading {:?} to {:?}",
                    file.name(),
                    descriptor,
                    format.type_descriptor
                );
            }
            return Ok(Some(len));
        }
    }
    Ok(None)
}

/// In-use flags of slots `0..slots`, read a chunk at a time
struct SlotScan<'a> {
    file: &'a StoreFile,
    record_size: usize,
    slots: u64,
    next: u64,
    chunk: Vec<u8>,
    chunk_start: u64,
}

impl<'a> SlotScan<'a> {
    fn new(file: &'a StoreFile, record_size: usize, slots: u64) -> Self {
        Self {
            file,
            record_size,
            slots,
            next: 0,
            chunk: Vec::new(),
            chunk_start: 0,
        }
    }
}

impl Iterator for SlotScan<'_> {
    type Item = Result<bool>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.slots {
            return None;
        }
        let chunk_slots = (self.chunk.len() / self.record_size) as u64;
        if self.next >= self.chunk_start + chunk_slots {
            let count = SCAN_CHUNK_SLOTS.min(self.slots - self.next);
            self.chunk = vec![0u8; count as usize * self.record_size];
            self.chunk_start = self.next;
            if let Err(e) = self
                .file
                .read_at(self.next * self.record_size as u64, &mut self.chunk)
            {
                self.next = self.slots;
                return Some(Err(e));
            }
        }
        let offset = (self.next - self.chunk_start) as usize * self.record_size;
        self.next += 1;
        Some(Ok(StoreFormat::is_in_use(&self.chunk[offset..])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn format() -> StoreFormat {
        StoreFormat::new("TestStore v1.0", 9)
    }

    fn config() -> StoreConfig {
        StoreConfig::default()
    }

    fn create_open(dir: &TempDir) -> RecordStore {
        let path = dir.path().join("x.db");
        RecordStore::create(&path, &format()).unwrap();
        RecordStore::open(&path, format(), &config()).unwrap()
    }

    fn record(flag: u8, value: u8) -> [u8; 9] {
        [flag, 0, 0, 0, value, 0, 0, 0, 0]
    }

    #[test]
    fn test_create_rejects_existing_and_unnamed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        RecordStore::create(&path, &format()).unwrap();
        assert!(matches!(
            RecordStore::create(&path, &format()),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            RecordStore::create(Path::new("/"), &format()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_descriptor_written_on_close() {
        let dir = TempDir::new().unwrap();
        let store = create_open(&dir);
        let owner = OwnerToken::new();
        let id = store.next_id().unwrap();
        store.write_slot(id, &record(1, 5), owner).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        let bytes = fs::read(dir.path().join("x.db")).unwrap();
        assert_eq!(bytes.len(), 9 + "TestStore v1.0".len());
        assert!(bytes.ends_with(b"TestStore v1.0"));
        assert_eq!(&bytes[..9], &record(1, 5));
    }

    #[test]
    fn test_out_of_range_and_recovery() {
        let dir = TempDir::new().unwrap();
        let store = create_open(&dir);
        let owner = OwnerToken::new();
        assert!(matches!(
            store.acquire_window(0, OpType::Read, owner),
            Err(Error::OutOfRange { position: 0, .. })
        ));

        store.set_recovery_mode(true);
        store.write_slot(4, &record(1, 1), owner).unwrap();
        store.set_recovery_mode(false);
        assert_eq!(store.high_id().unwrap(), 5);
        assert_eq!(store.read_slot(4, owner).unwrap(), record(1, 1));
    }

    #[test]
    fn test_recovery_writes_never_lower_high_id() {
        let dir = TempDir::new().unwrap();
        let store = create_open(&dir);
        store.set_recovery_mode(true);
        let owner = OwnerToken::new();
        store.write_slot(20, &record(1, 20), owner).unwrap();
        store.write_slot(10, &record(1, 10), owner).unwrap();
        assert_eq!(store.high_id().unwrap(), 21);

        std::thread::scope(|s| {
            for t in 0..8u64 {
                let store = &store;
                s.spawn(move || {
                    let owner = OwnerToken::new();
                    for id in (0..16u64).rev().map(|i| 22 + i * 8 + t) {
                        store.write_slot(id, &record(1, id as u8), owner).unwrap();
                    }
                });
            }
        });
        store.set_recovery_mode(false);
        assert_eq!(store.high_id().unwrap(), 22 + 15 * 8 + 7 + 1);
        assert_eq!(store.next_id().unwrap(), 22 + 16 * 8);
        assert_eq!(store.read_slot(20, owner).unwrap(), record(1, 20));
    }

    #[test]
    fn test_missing_descriptor_marks_not_ok() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        RecordStore::create(&path, &format()).unwrap();
        fs::write(&path, b"garbage").unwrap();

        let store = RecordStore::open(&path, format(), &config()).unwrap();
        assert!(!store.is_store_ok());
        assert!(matches!(store.validate(), Err(Error::StoreNotValid(_))));
        assert!(matches!(store.next_id(), Err(Error::StoreNotValid(_))));

        // 7 garbage bytes are a torn slot
        let report = store.make_store_ok().unwrap().unwrap();
        assert_eq!(report.high_id, 0);
        store.validate().unwrap();
        assert_eq!(store.next_id().unwrap(), 0);
        store.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"TestStore v1.0");
    }

    #[test]
    fn test_unclean_shutdown_rebuilds_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        {
            let store = create_open(&dir);
            let owner = OwnerToken::new();
            for value in 0..5 {
                let id = store.next_id().unwrap();
                let flag = if value == 1 || value == 4 { 0 } else { 1 };
                store.write_slot(id, &record(flag, value), owner).unwrap();
            }
            store.flush(1).unwrap();
            // dropped without close
        }

        let store = RecordStore::open(&path, format(), &config()).unwrap();
        assert!(!store.is_store_ok());
        let report = store.make_store_ok().unwrap().unwrap();
        assert_eq!(report.high_id, 4);
        assert_eq!(report.defragged, 1);
        assert!(store.make_store_ok().unwrap().is_none());

        assert_eq!(store.next_id().unwrap(), 1);
        assert_eq!(store.next_id().unwrap(), 4);
        store.close().unwrap();

        let store = RecordStore::open(&path, format(), &config()).unwrap();
        assert!(store.is_store_ok());
        assert_eq!(store.high_id().unwrap(), 5);
    }

    #[test]
    fn test_legacy_descriptor_is_upgraded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.db");
        let old = StoreFormat::new("TestStore v0.9", 9);
        RecordStore::create(&path, &old).unwrap();

        let store = RecordStore::open(&path, format().with_legacy("TestStore v0.9"), &config())
            .unwrap();
        assert!(store.is_store_ok());
        store.close().unwrap();
        assert!(fs::read(&path).unwrap().ends_with(b"TestStore v1.0"));
    }

    #[test]
    fn test_header_slots_are_reserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.db");
        let format = StoreFormat::new("HeaderStore v1.0", 4).with_header(vec![1, 0, 0, 9]);
        RecordStore::create(&path, &format).unwrap();
        let store = RecordStore::open(&path, format, &config()).unwrap();
        assert_eq!(store.next_id().unwrap(), 1);
        assert_eq!(store.read_slot(0, OwnerToken::new()).unwrap(), vec![1, 0, 0, 9]);
    }

    #[test]
    fn test_container_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graphstore.db");
        let format = StoreFormat::new("GraphStore v1.0", 0);
        RecordStore::create(&path, &format).unwrap();
        let store = RecordStore::open(&path, format, &config()).unwrap();
        assert!(store.is_store_ok());
        assert!(matches!(store.next_id(), Err(Error::InvalidArgument(_))));
        store.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"GraphStore v1.0");
        assert!(!id_file_path(&path).exists());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = TempDir::new().unwrap();
        let store = create_open(&dir);
        store.close().unwrap();
        assert!(store.next_id().is_err());
        assert!(store.flush(1).is_err());
    }
}
