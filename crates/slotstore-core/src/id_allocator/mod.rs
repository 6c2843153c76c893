//! Id allocator - hands out record ids and recycles freed ones
//!
//! Every store owns one allocator backed by a companion `<store>.id` file:
//!
//! ```text
//! [sticky: 1 byte][high id: 4 bytes BE][free id: 4 bytes BE]...
//! ```
//!
//! The sticky byte is set as soon as a session opens the file and cleared
//! only by a clean [`IdAllocator::close`]. Opening a sticky file fails with
//! [`Error::CorruptAllocator`]: the previous process died with ids in flight,
//! so the owning store must rebuild the file from a scan of its slots.
//!
//! Freed ids move between memory and the file in batches of `grab_size`:
//! released ids are appended once `grab_size` of them pile up, and reusable
//! ids are read back `grab_size` at a time.

use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Sticky byte + high id
pub const HEADER_SIZE: u64 = 5;

/// One free id on disk
pub const ID_ENTRY_SIZE: u64 = 4;

/// Reserved "no record" pointer value; never handed out as an id
pub const NO_ID: u64 = u32::MAX as u64;

/// Largest id the 4-byte on-disk encoding can hand out
pub const MAX_ID: u64 = NO_ID - 1;

const CLEAN: u8 = 0;
const STICKY: u8 = 1;

/// Outcome of [`IdAllocator::rebuild`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    /// Slots examined
    pub scanned: u64,
    /// Resulting high id
    pub high_id: u64,
    /// Not-in-use slots below the high id, now free ids
    pub defragged: u64,
}

struct Inner {
    /// None once closed
    file: Option<File>,
    high_id: u64,
    /// Next unread free-id entry in the file
    read_position: u64,
    /// End of the free-id list; batches are appended here
    write_position: u64,
    /// Free ids read back from the file, handed out first
    defragged: VecDeque<u64>,
    /// Ids freed this session and not yet written out
    released: VecDeque<u64>,
}

/// Allocator for one store's id space
pub struct IdAllocator {
    path: PathBuf,
    grab_size: usize,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("path", &self.path)
            .field("grab_size", &self.grab_size)
            .finish_non_exhaustive()
    }
}

impl IdAllocator {
    /// Write a fresh, cleanly closed id file with the given high id
    pub fn create(path: &Path, high_id: u64) -> Result<()> {
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        if high_id > NO_ID {
            return Err(Error::invalid_argument(format!(
                "high id {} does not fit the id file",
                high_id
            )));
        }

        let mut header = BytesMut::with_capacity(HEADER_SIZE as usize);
        header.put_u8(CLEAN);
        header.put_u32(high_id as u32);

        let mut file = File::create(path).map_err(|e| Error::io(name_of(path), 0, e))?;
        file.write_all(&header)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::io(name_of(path), 0, e))?;
        Ok(())
    }

    /// Open an existing id file and mark it sticky for this session
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use slotstore_core::id_allocator::IdAllocator;
    /// use std::path::Path;
    ///
    /// let ids = IdAllocator::open(Path::new("./data/nodestore.db.id"), 1024).unwrap();
    /// let id = ids.next_id().unwrap();
    /// ids.free_id(id).unwrap();
    /// ids.close().unwrap();
    /// ```
    pub fn open(path: &Path, grab_size: usize) -> Result<Self> {
        if grab_size == 0 {
            return Err(Error::invalid_argument("grab size must be > 0"));
        }
        if !path.exists() {
            return Err(Error::corrupt_allocator(path, "id file is missing"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(name_of(path), 0, e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::io(name_of(path), 0, e))?
            .len();

        if len < HEADER_SIZE {
            return Err(Error::corrupt_allocator(
                path,
                format!("header truncated ({} bytes)", len),
            ));
        }
        if (len - HEADER_SIZE) % ID_ENTRY_SIZE != 0 {
            return Err(Error::corrupt_allocator(
                path,
                format!("free list length {} is not a whole number of ids", len - HEADER_SIZE),
            ));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        read_exact_at(&file, &mut header, 0).map_err(|e| Error::io(name_of(path), 0, e))?;
        let mut buf = &header[..];
        let sticky = buf.get_u8();
        let high_id = buf.get_u32() as u64;

        if sticky != CLEAN {
            return Err(Error::corrupt_allocator(
                path,
                "sticky flag set, previous session did not close cleanly",
            ));
        }

        write_all_at(&file, &[STICKY], 0)
            .and_then(|_| file.sync_data())
            .map_err(|e| Error::io(name_of(path), 0, e))?;

        let allocator = Self {
            path: path.to_path_buf(),
            grab_size,
            inner: Mutex::new(Inner {
                file: Some(file),
                high_id,
                read_position: HEADER_SIZE,
                write_position: len,
                defragged: VecDeque::new(),
                released: VecDeque::new(),
            }),
        };

        {
            let mut inner = allocator.inner.lock();
            allocator.read_batch(&mut inner)?;
            debug!(
                path = %allocator.path.display(),
                high_id,
                free_ids = (len - HEADER_SIZE) / ID_ENTRY_SIZE,
                "Opened id allocator"
            );
        }

        Ok(allocator)
    }

    /// Recreate the id file from a sequential scan of a store's slots
    ///
    /// `slots` yields the in-use flag of slot 0, 1, 2, ... in order. Free
    /// slots are only recycled when an in-use slot follows them; trailing
    /// free slots fall beyond the new high id.
    pub fn rebuild<I>(path: &Path, grab_size: usize, slots: I) -> Result<(Self, RebuildReport)>
    where
        I: IntoIterator<Item = Result<bool>>,
    {
        if path.exists() {
            fs::remove_file(path).map_err(|e| Error::io(name_of(path), 0, e))?;
        }
        Self::create(path, 0)?;
        let allocator = Self::open(path, grab_size)?;

        let mut candidates: Vec<u64> = Vec::new();
        let mut report = RebuildReport {
            scanned: 0,
            high_id: 0,
            defragged: 0,
        };

        for (id, in_use) in slots.into_iter().enumerate() {
            let id = id as u64;
            report.scanned += 1;
            if in_use? {
                allocator.set_high_id(id + 1)?;
                report.defragged += candidates.len() as u64;
                for free in candidates.drain(..) {
                    allocator.free_id(free)?;
                }
            } else {
                candidates.push(id);
            }
        }
        report.high_id = allocator.high_id()?;

        info!(
            path = %path.display(),
            scanned = report.scanned,
            high_id = report.high_id,
            defragged = report.defragged,
            "Rebuilt id allocator"
        );
        Ok((allocator, report))
    }

    /// Next id to use: recycled ids first, then a brand new one
    pub fn next_id(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;

        if let Some(id) = inner.defragged.pop_front() {
            return Ok(id);
        }
        if inner.read_position < inner.write_position {
            self.read_batch(&mut inner)?;
            if let Some(id) = inner.defragged.pop_front() {
                return Ok(id);
            }
        }
        if let Some(id) = inner.released.pop_front() {
            return Ok(id);
        }

        if inner.high_id > MAX_ID {
            return Err(Error::CapacityExceeded {
                high_id: inner.high_id,
                max_id: MAX_ID,
            });
        }
        let id = inner.high_id;
        inner.high_id += 1;
        Ok(id)
    }

    /// Return an id for reuse
    pub fn free_id(&self, id: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;

        if id >= inner.high_id {
            return Err(Error::InvalidId {
                id,
                high_id: inner.high_id,
            });
        }
        inner.released.push_back(id);
        if inner.released.len() >= self.grab_size {
            let batch: Vec<u64> = inner.released.iter().copied().collect();
            if let Err(e) = self.write_batch(&mut inner, &batch) {
                // earlier ids stay queued; `id` was never freed
                inner.released.pop_back();
                return Err(e);
            }
            inner.released.clear();
        }
        Ok(())
    }

    /// Current allocation frontier
    pub fn high_id(&self) -> Result<u64> {
        let inner = self.inner.lock();
        self.ensure_open(&inner)?;
        Ok(inner.high_id)
    }

    /// Override the allocation frontier
    pub fn set_high_id(&self, high_id: u64) -> Result<()> {
        if high_id > NO_ID {
            return Err(Error::invalid_argument(format!(
                "high id {} exceeds the id space",
                high_id
            )));
        }
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;
        inner.high_id = high_id;
        Ok(())
    }

    /// Move the allocation frontier up to at least `min_high_id`; never
    /// lowers it. Returns the resulting high id.
    pub fn raise_high_id(&self, min_high_id: u64) -> Result<u64> {
        if min_high_id > NO_ID {
            return Err(Error::invalid_argument(format!(
                "high id {} exceeds the id space",
                min_high_id
            )));
        }
        let mut inner = self.inner.lock();
        self.ensure_open(&inner)?;
        inner.high_id = inner.high_id.max(min_high_id);
        Ok(inner.high_id)
    }

    /// Number of ids currently available for reuse, in memory and on disk
    pub fn free_id_count(&self) -> Result<u64> {
        let inner = self.inner.lock();
        self.ensure_open(&inner)?;
        let on_disk = (inner.write_position - inner.read_position) / ID_ENTRY_SIZE;
        Ok(inner.defragged.len() as u64 + inner.released.len() as u64 + on_disk)
    }

    /// Path of the id file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once [`close`](Self::close) ran
    pub fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }

    /// Write every outstanding free id back, compact the list, store the
    /// high id and clear the sticky flag.
    ///
    /// The compacted file is written next to the original and renamed over
    /// it, so a failure part way leaves the old (sticky) file untouched.
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(file) = inner.file.take() else {
            return Ok(());
        };

        let unread = ((inner.write_position - inner.read_position) / ID_ENTRY_SIZE) as usize;
        let mut ids: Vec<u64> =
            Vec::with_capacity(inner.defragged.len() + unread + inner.released.len());
        ids.extend(inner.defragged.drain(..));
        if unread > 0 {
            let mut raw = vec![0u8; unread * ID_ENTRY_SIZE as usize];
            read_exact_at(&file, &mut raw, inner.read_position)
                .map_err(|e| Error::io(name_of(&self.path), inner.read_position, e))?;
            let mut buf = &raw[..];
            while buf.has_remaining() {
                ids.push(buf.get_u32() as u64);
            }
        }
        ids.extend(inner.released.drain(..));
        drop(file);

        let mut content =
            BytesMut::with_capacity(HEADER_SIZE as usize + ids.len() * ID_ENTRY_SIZE as usize);
        content.put_u8(CLEAN);
        content.put_u32(inner.high_id as u32);
        for id in &ids {
            content.put_u32(*id as u32);
        }

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|e| Error::io(name_of(&self.path), 0, e))?;
        tmp.write_all(&content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::io(name_of(&self.path), 0, e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(name_of(&self.path), 0, e.error))?;

        debug!(
            path = %self.path.display(),
            high_id = inner.high_id,
            free_ids = ids.len(),
            "Closed id allocator"
        );
        Ok(())
    }

    fn ensure_open(&self, inner: &Inner) -> Result<()> {
        if inner.file.is_none() {
            return Err(Error::ClosedAllocator(self.path.clone()));
        }
        Ok(())
    }

    fn read_batch(&self, inner: &mut Inner) -> Result<()> {
        let available = ((inner.write_position - inner.read_position) / ID_ENTRY_SIZE) as usize;
        let count = available.min(self.grab_size);
        if count == 0 {
            return Ok(());
        }
        let Some(file) = inner.file.as_ref() else {
            return Err(Error::ClosedAllocator(self.path.clone()));
        };

        let mut raw = vec![0u8; count * ID_ENTRY_SIZE as usize];
        read_exact_at(file, &mut raw, inner.read_position)
            .map_err(|e| Error::io(name_of(&self.path), inner.read_position, e))?;
        inner.read_position += raw.len() as u64;

        let mut buf = &raw[..];
        while buf.has_remaining() {
            let id = buf.get_u32() as u64;
            if id >= inner.high_id {
                warn!(
                    path = %self.path.display(),
                    id,
                    high_id = inner.high_id,
                    "Skipping free id beyond high id"
                );
                continue;
            }
            inner.defragged.push_back(id);
        }
        Ok(())
    }

    fn write_batch(&self, inner: &mut Inner, ids: &[u64]) -> Result<()> {
        let Some(file) = inner.file.as_ref() else {
            return Err(Error::ClosedAllocator(self.path.clone()));
        };
        let mut buf = BytesMut::with_capacity(ids.len() * ID_ENTRY_SIZE as usize);
        for id in ids {
            buf.put_u32(*id as u32);
        }
        write_all_at(file, &buf, inner.write_position)
            .map_err(|e| Error::io(name_of(&self.path), inner.write_position, e))?;
        inner.write_position += buf.len() as u64;
        Ok(())
    }
}

fn name_of(path: &Path) -> String {
    crate::store::file::store_name(path)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "id file shorter than expected",
                ));
            }
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        let n = file.seek_write(data, offset)?;
        data = &data[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn fresh(dir: &TempDir, grab_size: usize) -> (IdAllocator, PathBuf) {
        let path = dir.path().join("test.db.id");
        IdAllocator::create(&path, 0).unwrap();
        (IdAllocator::open(&path, grab_size).unwrap(), path)
    }

    #[test]
    fn test_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let (ids, _) = fresh(&dir, 8);
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 2);
        assert_eq!(ids.high_id().unwrap(), 3);
    }

    #[test]
    fn test_freed_id_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (ids, path) = fresh(&dir, 8);
        for _ in 0..3 {
            ids.next_id().unwrap();
        }
        ids.free_id(1).unwrap();
        ids.close().unwrap();

        let ids = IdAllocator::open(&path, 8).unwrap();
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 3);
    }

    #[test]
    fn test_sticky_flag_detects_crash() {
        let dir = TempDir::new().unwrap();
        let (ids, path) = fresh(&dir, 8);
        ids.next_id().unwrap();
        // dropped without close
        drop(ids);

        let err = IdAllocator::open(&path, 8).unwrap_err();
        assert!(matches!(err, Error::CorruptAllocator { .. }));
    }

    #[test]
    fn test_missing_and_truncated_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.id");
        assert!(matches!(
            IdAllocator::open(&missing, 8),
            Err(Error::CorruptAllocator { .. })
        ));

        let truncated = dir.path().join("truncated.id");
        fs::write(&truncated, [0u8, 0, 0]).unwrap();
        assert!(matches!(
            IdAllocator::open(&truncated, 8),
            Err(Error::CorruptAllocator { .. })
        ));
    }

    #[test]
    fn test_free_outside_range_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (ids, _) = fresh(&dir, 8);
        ids.next_id().unwrap();
        assert!(matches!(
            ids.free_id(1),
            Err(Error::InvalidId { id: 1, high_id: 1 })
        ));
        assert!(matches!(ids.free_id(NO_ID), Err(Error::InvalidId { .. })));
    }

    #[test]
    fn test_capacity_exceeded() {
        let dir = TempDir::new().unwrap();
        let (ids, _) = fresh(&dir, 8);
        ids.set_high_id(MAX_ID).unwrap();
        assert_eq!(ids.next_id().unwrap(), MAX_ID);
        assert!(matches!(ids.next_id(), Err(Error::CapacityExceeded { .. })));
        assert!(ids.set_high_id(NO_ID + 1).is_err());
    }

    #[test]
    fn test_released_batch_goes_to_disk_and_comes_back() {
        let dir = TempDir::new().unwrap();
        let (ids, path) = fresh(&dir, 2);
        for _ in 0..6 {
            ids.next_id().unwrap();
        }
        ids.free_id(4).unwrap();
        ids.free_id(2).unwrap();
        // grab size reached, both ids appended to the file
        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            HEADER_SIZE + 2 * ID_ENTRY_SIZE
        );
        ids.free_id(0).unwrap();

        assert_eq!(ids.next_id().unwrap(), 4);
        assert_eq!(ids.next_id().unwrap(), 2);
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 6);
    }

    #[test]
    fn test_failed_batch_write_keeps_free_ids() {
        let dir = TempDir::new().unwrap();
        let (ids, path) = fresh(&dir, 2);
        for _ in 0..4 {
            ids.next_id().unwrap();
        }
        ids.free_id(0).unwrap();
        assert_eq!(ids.free_id_count().unwrap(), 1);

        // a read-only handle makes the batch append fail
        let writable = ids.inner.lock().file.replace(File::open(&path).unwrap());
        assert!(matches!(ids.free_id(1), Err(Error::Io { .. })));
        assert_eq!(ids.free_id_count().unwrap(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE);

        ids.inner.lock().file = writable;
        ids.free_id(1).unwrap();
        assert_eq!(ids.free_id_count().unwrap(), 2);
        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            HEADER_SIZE + 2 * ID_ENTRY_SIZE
        );
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 4);
    }

    #[test]
    fn test_raise_high_id_never_lowers() {
        let dir = TempDir::new().unwrap();
        let (ids, _) = fresh(&dir, 8);
        assert_eq!(ids.raise_high_id(21).unwrap(), 21);
        assert_eq!(ids.raise_high_id(11).unwrap(), 21);
        assert_eq!(ids.high_id().unwrap(), 21);
        assert!(ids.raise_high_id(NO_ID + 1).is_err());
        assert_eq!(ids.next_id().unwrap(), 21);
    }

    #[test]
    fn test_close_compacts_consumed_entries() {
        let dir = TempDir::new().unwrap();
        let (ids, path) = fresh(&dir, 2);
        for _ in 0..10 {
            ids.next_id().unwrap();
        }
        for id in [1, 3, 5, 7] {
            ids.free_id(id).unwrap();
        }
        assert_eq!(ids.next_id().unwrap(), 1);
        ids.close().unwrap();

        // 1 was consumed; 3, 5, 7 remain
        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            HEADER_SIZE + 3 * ID_ENTRY_SIZE
        );
        let raw = fs::read(&path).unwrap();
        assert_eq!(raw[0], CLEAN);

        let ids = IdAllocator::open(&path, 2).unwrap();
        assert_eq!(ids.high_id().unwrap(), 10);
        assert_eq!(ids.free_id_count().unwrap(), 3);
        let reused: BTreeSet<u64> = (0..3).map(|_| ids.next_id().unwrap()).collect();
        assert_eq!(reused, BTreeSet::from([3, 5, 7]));
        assert_eq!(ids.next_id().unwrap(), 10);
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let dir = TempDir::new().unwrap();
        let (ids, _) = fresh(&dir, 8);
        ids.next_id().unwrap();
        ids.close().unwrap();
        ids.close().unwrap();
        assert!(ids.is_closed());
        assert!(matches!(ids.next_id(), Err(Error::ClosedAllocator(_))));
        assert!(matches!(ids.free_id(0), Err(Error::ClosedAllocator(_))));
        assert!(matches!(ids.high_id(), Err(Error::ClosedAllocator(_))));
    }

    #[test]
    fn test_rebuild_from_scan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.db.id");
        // in use: 0, 3, 4 ; free: 1, 2, 5, 6
        let slots = [true, false, false, true, true, false, false];
        let (ids, report) =
            IdAllocator::rebuild(&path, 8, slots.iter().map(|b| Ok(*b))).unwrap();

        assert_eq!(report.scanned, 7);
        assert_eq!(report.high_id, 5);
        assert_eq!(report.defragged, 2);
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 2);
        assert_eq!(ids.next_id().unwrap(), 5);
    }

    #[test]
    fn test_rebuild_replaces_sticky_file() {
        let dir = TempDir::new().unwrap();
        let (ids, path) = fresh(&dir, 8);
        ids.next_id().unwrap();
        drop(ids);

        let (ids, report) = IdAllocator::rebuild(&path, 8, [Ok(true)]).unwrap();
        assert_eq!(report.high_id, 1);
        ids.close().unwrap();
        IdAllocator::open(&path, 8).unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Next,
        Free(usize),
        Reopen,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Next),
            2 => any::<usize>().prop_map(Op::Free),
            1 => Just(Op::Reopen),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_free_ids_are_reused_before_new_ones(
            ops in proptest::collection::vec(op(), 1..80),
            grab_size in 1usize..5,
        ) {
            let dir = TempDir::new().unwrap();
            let (mut ids, path) = fresh(&dir, grab_size);
            let mut in_use: BTreeSet<u64> = BTreeSet::new();
            let mut free: BTreeSet<u64> = BTreeSet::new();
            let mut max_returned: Option<u64> = None;

            for op in ops {
                match op {
                    Op::Next => {
                        let id = ids.next_id().unwrap();
                        if free.is_empty() {
                            prop_assert_eq!(Some(id), max_returned.map_or(Some(0), |m| Some(m + 1)));
                        } else {
                            prop_assert!(free.remove(&id), "id {} was not free", id);
                        }
                        prop_assert!(in_use.insert(id));
                        max_returned = Some(max_returned.map_or(id, |m| m.max(id)));
                    }
                    Op::Free(pick) => {
                        if in_use.is_empty() {
                            continue;
                        }
                        let id = *in_use.iter().nth(pick % in_use.len()).unwrap();
                        in_use.remove(&id);
                        ids.free_id(id).unwrap();
                        free.insert(id);
                    }
                    Op::Reopen => {
                        ids.close().unwrap();
                        ids = IdAllocator::open(&path, grab_size).unwrap();
                    }
                }
                prop_assert_eq!(ids.high_id().unwrap(), max_returned.map_or(0, |m| m + 1));
                prop_assert_eq!(ids.free_id_count().unwrap(), free.len() as u64);
            }
        }
    }
}
