//! Window pool: memory-mapped bricks under a budget, row windows everywhere else
//!
//! The store file is cut into equal bricks. Every acquisition counts a hit on
//! the brick covering the requested id; acquisitions that end up on a row
//! window also count a miss, and every `refresh_threshold` misses the pool
//! re-evaluates which bricks deserve a mapping:
//!
//! ```text
//!   hits /= decay                      (unmapped bricks decay faster)
//!   fill free budget, hottest first    (stop at a brick with no hits)
//!   swap hottest unmapped <-> coldest mapped while it pays off
//! ```
//!
//! A brick is never mapped while a row window inside its range is open, so
//! one record is only ever reachable through one window.
//!
//! The pool mutex covers lookups and bookkeeping only. A refresh picks its
//! bricks under the mutex, reserves their budget, then grows the file, maps
//! and forces evicted bricks without it, and installs the new mappings under
//! the mutex again.

use super::{OpType, OwnerToken, Window, WindowKind};
use crate::config::BrickPolicy;
use crate::store::file::StoreFile;
use crate::{Error, Result};
use memmap2::MmapOptions;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Budget below `MIN_BRICK_RECORDS * record_size` disables mapping
const MIN_BRICK_RECORDS: u64 = 10;

/// Target number of bricks the budget is divided into
const BUDGET_DIVISOR: u64 = 1000;

struct Brick {
    index: usize,
    hits: u64,
    window: Option<Arc<Window>>,
    /// A refresh is mapping this brick outside the pool mutex
    pending: bool,
}

/// Work a refresh decided on under the pool mutex
#[derive(Default)]
struct RefreshPlan {
    /// Bricks to map, budget already reserved
    map: Vec<usize>,
    /// How many of `map` replace an evicted brick
    switches: usize,
    /// Mappings taken out of the pool, forced before they drop
    evicted: Vec<Arc<Window>>,
}

struct PoolState {
    bricks: Vec<Brick>,
    rows: BTreeMap<u64, Arc<Window>>,
    mapped_bytes: u64,
    misses_since_refresh: u64,
    closed: bool,
}

#[derive(Default)]
struct PoolCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    switches: AtomicU64,
    mapping_failures: AtomicU64,
    row_writes: AtomicU64,
}

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowPoolStats {
    /// Acquisitions served by a mapped brick
    pub hits: u64,
    /// Acquisitions served by a row window
    pub misses: u64,
    /// Brick refresh passes run
    pub refreshes: u64,
    /// Mapped bricks evicted in favour of hotter ones
    pub switches: u64,
    /// Mapping attempts that failed and were absorbed
    pub mapping_failures: u64,
    /// Row windows written back on release
    pub row_writes: u64,
    /// Brick size in bytes (0 when mapping is disabled)
    pub brick_size: u64,
    /// Bricks the file is currently divided into
    pub brick_count: usize,
    /// Bricks holding a live mapping
    pub mapped_bricks: usize,
    /// Bytes currently mapped
    pub mapped_bytes: u64,
    /// Row windows currently open
    pub row_windows: usize,
}

/// Caches regions of one store file as lockable windows
pub struct WindowPool {
    file: Arc<StoreFile>,
    record_size: usize,
    budget: u64,
    /// Bytes per brick, always a multiple of `record_size`; 0 disables mapping
    brick_size: u64,
    policy: BrickPolicy,
    state: Mutex<PoolState>,
    counters: PoolCounters,
}

impl std::fmt::Debug for WindowPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowPool")
            .field("store", &self.file.name())
            .field("record_size", &self.record_size)
            .field("budget", &self.budget)
            .field("brick_size", &self.brick_size)
            .finish_non_exhaustive()
    }
}

impl WindowPool {
    /// Size the bricks for the current file length and map whatever fits
    pub fn new(
        file: Arc<StoreFile>,
        record_size: usize,
        budget: u64,
        policy: BrickPolicy,
    ) -> Result<Self> {
        let file_size = file.len()?;
        let (brick_size, brick_count, map_initially) =
            setup(record_size as u64, budget, file_size, policy.max_brick_count);

        let bricks = (0..brick_count)
            .map(|index| Brick {
                index,
                hits: 0,
                window: None,
                pending: false,
            })
            .collect();

        let pool = Self {
            file,
            record_size,
            budget,
            brick_size,
            policy,
            state: Mutex::new(PoolState {
                bricks,
                rows: BTreeMap::new(),
                mapped_bytes: 0,
                misses_since_refresh: 0,
                closed: false,
            }),
            counters: PoolCounters::default(),
        };

        if map_initially {
            let mut state = pool.state.lock();
            for index in 0..brick_count {
                if state.mapped_bytes + brick_size > budget {
                    break;
                }
                pool.map_brick(&mut state, index);
            }
        }

        debug!(
            "Window pool for {}: budget={} brick_size={} bricks={} mapped={}",
            pool.file.name(),
            budget,
            brick_size,
            brick_count,
            pool.state.lock().mapped_bytes
        );
        Ok(pool)
    }

    /// Bytes per record
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Bytes per brick, 0 when mapping is disabled
    pub fn brick_size(&self) -> u64 {
        self.brick_size
    }

    /// Lock a window covering record `position` for `owner`
    ///
    /// Blocks while another owner holds that window. The returned guard
    /// releases the window when dropped.
    pub fn acquire(&self, position: u64, op: OpType, owner: OwnerToken) -> Result<WindowGuard<'_>> {
        let mut refreshed = false;
        let window = loop {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::storage(format!(
                    "window pool for {} is closed",
                    self.file.name()
                )));
            }

            let brick = self.brick_index(&mut state, position);
            if let Some(index) = brick.filter(|_| !refreshed) {
                state.bricks[index].hits += 1;
            }

            let mapped = brick.and_then(|i| state.bricks[i].window.clone());
            if mapped.is_none() && !refreshed {
                state.misses_since_refresh += 1;
                if state.misses_since_refresh >= self.policy.refresh_threshold {
                    state.misses_since_refresh = 0;
                    drop(state);
                    self.refresh();
                    refreshed = true;
                    continue;
                }
            }

            let window = match mapped {
                Some(window) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    window
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    let record_size = self.record_size;
                    state
                        .rows
                        .entry(position)
                        .or_insert_with(|| Arc::new(Window::row(position, record_size)))
                        .clone()
                }
            };
            window.mark();
            break window;
        };

        window.lock().lock(owner);
        window.unmark();

        let mut guard = WindowGuard {
            pool: self,
            window,
            owner,
            op,
            released: false,
        };
        if guard.window.kind() == WindowKind::Row {
            if let Err(e) = guard.window.load(&self.file) {
                guard.release()?;
                return Err(e);
            }
        }
        Ok(guard)
    }

    /// Run a brick refresh pass now, independent of the miss counter
    pub fn refresh_bricks(&self) {
        self.state.lock().misses_since_refresh = 0;
        self.refresh();
    }

    /// Force every mapped brick, then sync the file once
    pub fn flush_all(&self) -> Result<()> {
        let mapped: Vec<Arc<Window>> = {
            let state = self.state.lock();
            state
                .bricks
                .iter()
                .filter_map(|b| b.window.clone())
                .collect()
        };
        for window in &mapped {
            window.force(&self.file)?;
        }
        self.file.sync()
    }

    /// Flush, unmap every brick and forget all row windows
    pub fn close(&self) -> Result<()> {
        if self.state.lock().closed {
            return Ok(());
        }
        self.flush_all()?;
        let mut state = self.state.lock();
        state.bricks.clear();
        state.rows.clear();
        state.mapped_bytes = 0;
        state.closed = true;
        debug!("Window pool for {} closed", self.file.name());
        Ok(())
    }

    /// Force and unmap every brick so the file can shrink safely
    ///
    /// Fails when a brick is still locked or about to be. Bricks get mapped
    /// again by later refreshes.
    pub fn unmap_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        let busy = state.bricks.iter().any(|b| {
            b.pending || b.window.as_deref().is_some_and(|w| !Self::evictable(w))
        });
        if busy {
            return Err(Error::storage(format!(
                "{}: cannot unmap bricks while windows are held",
                self.file.name()
            )));
        }
        for index in 0..state.bricks.len() {
            self.unmap_brick(&mut state, index);
            state.bricks[index].hits = 0;
        }
        Ok(())
    }

    /// Counter snapshot
    pub fn stats(&self) -> WindowPoolStats {
        let state = self.state.lock();
        WindowPoolStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            switches: self.counters.switches.load(Ordering::Relaxed),
            mapping_failures: self.counters.mapping_failures.load(Ordering::Relaxed),
            row_writes: self.counters.row_writes.load(Ordering::Relaxed),
            brick_size: self.brick_size,
            brick_count: state.bricks.len(),
            mapped_bricks: state.bricks.iter().filter(|b| b.window.is_some()).count(),
            mapped_bytes: state.mapped_bytes,
            row_windows: state.rows.len(),
        }
    }

    /// Byte ranges `(offset, len)` of the mapped bricks, in file order
    pub fn mapped_regions(&self) -> Vec<(u64, u64)> {
        let state = self.state.lock();
        state
            .bricks
            .iter()
            .filter(|b| b.window.is_some())
            .map(|b| (b.index as u64 * self.brick_size, self.brick_size))
            .collect()
    }

    /// Brick covering `position`, growing the brick array when the file did
    fn brick_index(&self, state: &mut PoolState, position: u64) -> Option<usize> {
        if self.brick_size == 0 {
            return None;
        }
        let brick_records = self.brick_size / self.record_size as u64;
        let index = usize::try_from(position / brick_records).ok()?;
        if index >= self.policy.max_brick_count {
            return None;
        }
        while state.bricks.len() <= index {
            let next = state.bricks.len();
            state.bricks.push(Brick {
                index: next,
                hits: 0,
                window: None,
                pending: false,
            });
        }
        Some(index)
    }

    fn overlaps_row_window(&self, state: &PoolState, index: usize) -> bool {
        let brick_records = self.brick_size / self.record_size as u64;
        let start = index as u64 * brick_records;
        state.rows.range(start..start + brick_records).next().is_some()
    }

    /// Map brick `index`. Failures are logged and counted, never returned.
    fn map_brick(&self, state: &mut PoolState, index: usize) -> bool {
        let offset = index as u64 * self.brick_size;
        match self.try_map(offset) {
            Ok(window) => {
                state.bricks[index].window = Some(Arc::new(window));
                state.mapped_bytes += self.brick_size;
                true
            }
            Err(e) => {
                self.counters.mapping_failures.fetch_add(1, Ordering::Relaxed);
                warn!("{}: {}", self.file.name(), e);
                false
            }
        }
    }

    fn try_map(&self, offset: u64) -> Result<Window> {
        let len = self.brick_size as usize;
        self.file.ensure_len(offset + self.brick_size)?;
        // SAFETY: the store file is exclusively locked by this process and only
        // ever grown while the pool is open, so the mapped range stays valid.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(self.file.handle())
        }
        .map_err(|source| Error::MappingUnavailable {
            offset,
            len,
            source,
        })?;
        Ok(Window::brick(
            offset / self.record_size as u64,
            self.record_size,
            map,
        ))
    }

    /// Drop the mapping of brick `index` after forcing it
    fn unmap_brick(&self, state: &mut PoolState, index: usize) {
        if let Some(window) = state.bricks[index].window.take() {
            if let Err(e) = window.force(&self.file) {
                warn!("{}: failed to force evicted brick {}: {}", self.file.name(), index, e);
            }
            state.mapped_bytes -= self.brick_size;
        }
    }

    fn evictable(window: &Window) -> bool {
        !window.lock().is_locked() && !window.is_marked() && window.lock().waiting() == 0
    }

    /// One refresh pass: plan under the mutex, map and force outside it,
    /// then install what was mapped
    fn refresh(&self) {
        let plan = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            self.plan_refresh(&mut state)
        };

        for window in &plan.evicted {
            if let Err(e) = window.force(&self.file) {
                warn!("{}: failed to force evicted brick: {}", self.file.name(), e);
            }
        }
        let mapped: Vec<(usize, Result<Window>)> = plan
            .map
            .iter()
            .map(|&index| (index, self.try_map(index as u64 * self.brick_size)))
            .collect();

        let mut state = self.state.lock();
        let mut installed = 0;
        for (index, result) in mapped {
            if state.closed || index >= state.bricks.len() {
                continue;
            }
            state.bricks[index].pending = false;
            match result {
                Ok(window)
                    if state.bricks[index].window.is_none()
                        && !self.overlaps_row_window(&state, index) =>
                {
                    state.bricks[index].window = Some(Arc::new(window));
                    installed += 1;
                }
                Ok(_) => state.mapped_bytes -= self.brick_size,
                Err(e) => {
                    state.mapped_bytes -= self.brick_size;
                    self.counters.mapping_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("{}: {}", self.file.name(), e);
                }
            }
        }
        let switched = installed.min(plan.switches) as u64;
        self.counters.switches.fetch_add(switched, Ordering::Relaxed);

        if installed > 0 || !plan.evicted.is_empty() {
            info!(
                "{}: brick refresh mapped {} and evicted {} (mapped bytes {}/{})",
                self.file.name(),
                installed,
                plan.evicted.len(),
                state.mapped_bytes,
                self.budget
            );
        }
    }

    /// Decay the hit counts and decide which bricks to map and evict
    fn plan_refresh(&self, state: &mut PoolState) -> RefreshPlan {
        let mut plan = RefreshPlan::default();
        if self.brick_size == 0 || state.bricks.is_empty() {
            return plan;
        }
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);

        for brick in &mut state.bricks {
            let decay = if brick.window.is_some() {
                self.policy.mapped_decay
            } else {
                self.policy.unmapped_decay
            };
            brick.hits = (brick.hits as f64 / decay) as u64;
        }

        let mut unmapped: Vec<(usize, u64)> = state
            .bricks
            .iter()
            .filter(|b| b.window.is_none() && !b.pending)
            .map(|b| (b.index, b.hits))
            .collect();
        unmapped.sort_by(|a, b| b.1.cmp(&a.1));

        // Fill unused budget
        let mut remaining = Vec::new();
        for (index, hits) in unmapped {
            if hits == 0 {
                break;
            }
            if self.overlaps_row_window(state, index) {
                continue;
            }
            if state.mapped_bytes + self.brick_size > self.budget {
                remaining.push((index, hits));
                continue;
            }
            self.reserve(state, index, &mut plan);
        }

        // Swap hotter unmapped bricks in for colder mapped ones
        for (index, hits) in remaining {
            let coldest = state
                .bricks
                .iter()
                .filter(|b| b.window.as_deref().is_some_and(Self::evictable))
                .min_by_key(|b| b.hits)
                .map(|b| (b.index, b.hits));
            let Some((victim, victim_hits)) = coldest else {
                break;
            };
            if hits <= victim_hits {
                break;
            }
            if let Some(window) = state.bricks[victim].window.take() {
                state.mapped_bytes -= self.brick_size;
                plan.evicted.push(window);
            }
            self.reserve(state, index, &mut plan);
            plan.switches += 1;
        }
        plan
    }

    fn reserve(&self, state: &mut PoolState, index: usize, plan: &mut RefreshPlan) {
        state.bricks[index].pending = true;
        state.mapped_bytes += self.brick_size;
        plan.map.push(index);
    }

    fn release_window(&self, window: &Arc<Window>, owner: OwnerToken, op: OpType) -> Result<()> {
        if window.kind() == WindowKind::Row {
            let written = if op == OpType::Write && window.is_dirty() {
                let result = window.force(&self.file);
                if result.is_ok() {
                    self.counters.row_writes.fetch_add(1, Ordering::Relaxed);
                }
                result
            } else {
                Ok(())
            };

            {
                let mut state = self.state.lock();
                let last_hold = window.lock().depth() == 1;
                if last_hold && !window.is_marked() && window.lock().waiting() == 0 {
                    let same = state
                        .rows
                        .get(&window.position())
                        .is_some_and(|w| Arc::ptr_eq(w, window));
                    if same {
                        state.rows.remove(&window.position());
                    }
                }
            }

            window.lock().unlock(owner)?;
            return written;
        }
        window.lock().unlock(owner).map(|_| ())
    }
}

/// Compute `(brick_size, brick_count, map_all)` for a file
fn setup(record_size: u64, budget: u64, file_size: u64, max_brick_count: usize) -> (u64, usize, bool) {
    if record_size == 0 || budget < MIN_BRICK_RECORDS * record_size {
        return (0, 0, false);
    }
    let round = |bytes: u64| ((bytes / record_size) * record_size).max(record_size);
    let max_bricks = max_brick_count as u64;

    if file_size == 0 {
        return (round(budget / BUDGET_DIVISOR), 0, false);
    }

    if budget >= file_size {
        let brick_size = round(budget / BUDGET_DIVISOR);
        let count = file_size.div_ceil(brick_size).min(max_bricks);
        return (brick_size, count as usize, true);
    }

    // Budget covers a fraction of the file: divide it finer and map on demand
    let wanted = (BUDGET_DIVISOR as u128 * file_size as u128).div_ceil(budget as u128);
    let count = wanted.min(max_bricks as u128) as u64;
    let brick_size = round(file_size / count);
    let count = file_size.div_ceil(brick_size).min(max_bricks);
    (brick_size, count as usize, false)
}

/// A locked window. Dropping the guard releases it.
pub struct WindowGuard<'a> {
    pool: &'a WindowPool,
    window: Arc<Window>,
    owner: OwnerToken,
    op: OpType,
    released: bool,
}

impl std::fmt::Debug for WindowGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowGuard")
            .field("window", &self.window)
            .field("owner", &self.owner)
            .field("op", &self.op)
            .field("released", &self.released)
            .finish()
    }
}

impl WindowGuard<'_> {
    /// Row or brick
    pub fn kind(&self) -> WindowKind {
        self.window.kind()
    }

    /// First record id the window covers
    pub fn position(&self) -> u64 {
        self.window.position()
    }

    /// Number of records the window covers
    pub fn size(&self) -> u64 {
        self.window.size()
    }

    /// Access mode requested at acquire
    pub fn op(&self) -> OpType {
        self.op
    }

    /// Owner holding the window lock
    pub fn owner(&self) -> OwnerToken {
        self.owner
    }

    /// True once released
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn check_live(&self) -> Result<()> {
        if self.released {
            return Err(Error::storage("window used after release"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_live()?;
        if self.op == OpType::Read {
            return Err(Error::invalid_argument("write through a window acquired for read"));
        }
        Ok(())
    }

    /// Copy out the whole slot of record `id`
    pub fn read_record(&self, id: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.window.record_size()];
        self.read_bytes(id, 0, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` from `offset` bytes into record `id`
    pub fn read_bytes(&self, id: u64, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_live()?;
        self.window.read(id, offset, buf)
    }

    /// Overwrite the whole slot of record `id`
    pub fn write_record(&self, id: u64, data: &[u8]) -> Result<()> {
        if data.len() != self.window.record_size() {
            return Err(Error::invalid_argument(format!(
                "record is {} bytes, slot is {}",
                data.len(),
                self.window.record_size()
            )));
        }
        self.write_bytes(id, 0, data)
    }

    /// Overwrite `data.len()` bytes at `offset` inside record `id`
    pub fn write_bytes(&self, id: u64, offset: usize, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.window.write(id, offset, data)
    }

    /// In-use flag (bit 0 of the first slot byte) of record `id`
    pub fn in_use(&self, id: u64) -> Result<bool> {
        let mut flag = [0u8; 1];
        self.read_bytes(id, 0, &mut flag)?;
        Ok(flag[0] & 0x1 != 0)
    }

    /// Unlock the window, writing a row window back first. A second call does nothing.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.pool.release_window(&self.window, self.owner, self.op)
    }
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Window {} release failed on drop: {}", self.window.position(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    const RECORD: usize = 9;

    fn store_file(dir: &TempDir, records: u64) -> Arc<StoreFile> {
        let path = dir.path().join("pool.db");
        let file = File::create(&path).unwrap();
        file.set_len(records * RECORD as u64).unwrap();
        drop(file);
        Arc::new(StoreFile::open(&path).unwrap())
    }

    fn pool(dir: &TempDir, records: u64, budget: u64, policy: BrickPolicy) -> WindowPool {
        WindowPool::new(store_file(dir, records), RECORD, budget, policy).unwrap()
    }

    fn assert_regions_valid(pool: &WindowPool, budget: u64) {
        let regions = pool.mapped_regions();
        let mut total = 0;
        for pair in regions.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlapping bricks {:?}", pair);
        }
        for (offset, len) in &regions {
            assert_eq!(offset % RECORD as u64, 0);
            assert_eq!(len % RECORD as u64, 0);
            total += len;
        }
        assert!(total <= budget);
    }

    #[test]
    fn test_setup_disabled_below_floor() {
        assert_eq!(setup(9, 89, 10_000, 100_000), (0, 0, false));
        assert_eq!(setup(0, 1 << 20, 10_000, 100_000), (0, 0, false));
    }

    #[test]
    fn test_setup_whole_file_fits() {
        let (brick, count, map_all) = setup(9, 90_000, 9_000, 100_000);
        assert_eq!(brick, 90);
        assert_eq!(count, 100);
        assert!(map_all);
    }

    #[test]
    fn test_setup_partial_budget() {
        let (brick, count, map_all) = setup(9, 9_000, 90_000, 100_000);
        assert!(!map_all);
        assert_eq!(brick % 9, 0);
        assert!(brick >= 9);
        assert_eq!(count as u64, 90_000u64.div_ceil(brick));
    }

    #[test]
    fn test_small_budget_always_row_windows() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 100, (RECORD * 10 - 1) as u64, BrickPolicy::default());
        let owner = OwnerToken::new();
        for id in 0..50 {
            let guard = pool.acquire(id, OpType::Read, owner).unwrap();
            assert_eq!(guard.kind(), WindowKind::Row);
        }
        pool.refresh_bricks();
        assert_eq!(pool.acquire(3, OpType::Read, owner).unwrap().kind(), WindowKind::Row);
        assert!(pool.mapped_regions().is_empty());
    }

    #[test]
    fn test_full_budget_maps_bricks() {
        let dir = TempDir::new().unwrap();
        let budget = 1 << 20;
        let pool = pool(&dir, 1_000, budget, BrickPolicy::default());
        let owner = OwnerToken::new();

        let guard = pool.acquire(500, OpType::Write, owner).unwrap();
        assert_eq!(guard.kind(), WindowKind::Brick);
        assert!(guard.position() <= 500);
        guard.write_record(500, &[1, 0, 0, 0, 7, 0, 0, 0, 9]).unwrap();
        drop(guard);

        let guard = pool.acquire(500, OpType::Read, owner).unwrap();
        assert!(guard.in_use(500).unwrap());
        assert_eq!(guard.read_record(500).unwrap()[4], 7);
        assert_regions_valid(&pool, budget);
        assert!(pool.stats().hits >= 2);
    }

    #[test]
    fn test_row_window_writes_back_on_release() {
        let dir = TempDir::new().unwrap();
        let file = store_file(&dir, 10);
        let pool = WindowPool::new(file.clone(), RECORD, 0, BrickPolicy::default()).unwrap();
        let owner = OwnerToken::new();

        let mut guard = pool.acquire(4, OpType::Write, owner).unwrap();
        guard.write_bytes(4, 0, &[1]).unwrap();
        guard.release().unwrap();
        guard.release().unwrap();
        drop(guard);

        let mut flag = [0u8; 1];
        file.read_at(4 * RECORD as u64, &mut flag).unwrap();
        assert_eq!(flag, [1]);
        assert_eq!(pool.stats().row_windows, 0);
        assert_eq!(pool.stats().row_writes, 1);
    }

    #[test]
    fn test_read_guard_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 10, 0, BrickPolicy::default());
        let guard = pool.acquire(1, OpType::Read, OwnerToken::new()).unwrap();
        assert!(guard.write_bytes(1, 0, &[1]).is_err());
        assert!(guard.read_record(2).is_err());
    }

    #[test]
    fn test_guard_rejects_offsets_past_record() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 10, 0, BrickPolicy::default());
        let guard = pool.acquire(1, OpType::Write, OwnerToken::new()).unwrap();
        assert!(guard.read_bytes(1, usize::MAX, &mut [0; 2]).is_err());
        assert!(guard.write_bytes(1, usize::MAX, &[1]).is_err());
        assert!(guard.write_bytes(1, RECORD, &[1]).is_err());
        guard.write_bytes(1, RECORD - 1, &[1]).unwrap();
    }

    #[test]
    fn test_reentrant_acquire_same_owner() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 10, 0, BrickPolicy::default());
        let owner = OwnerToken::new();
        let outer = pool.acquire(2, OpType::Write, owner).unwrap();
        let inner = pool.acquire(2, OpType::Read, owner).unwrap();
        drop(inner);
        assert_eq!(pool.stats().row_windows, 1);
        drop(outer);
        assert_eq!(pool.stats().row_windows, 0);
    }

    #[test]
    fn test_refresh_promotes_hot_brick() {
        let dir = TempDir::new().unwrap();
        let policy = BrickPolicy {
            refresh_threshold: 20,
            ..BrickPolicy::default()
        };
        // 9_000 bytes of budget over a 90_000 byte file
        let budget = 9_000;
        let pool = pool(&dir, 10_000, budget, policy);
        assert!(pool.mapped_regions().is_empty());

        let owner = OwnerToken::new();
        for _ in 0..200 {
            drop(pool.acquire(42, OpType::Read, owner).unwrap());
        }
        let guard = pool.acquire(42, OpType::Read, owner).unwrap();
        assert_eq!(guard.kind(), WindowKind::Brick);
        drop(guard);

        let stats = pool.stats();
        assert!(stats.refreshes >= 1);
        assert!(stats.mapped_bricks >= 1);
        assert_regions_valid(&pool, budget);
    }

    #[test]
    fn test_refresh_swaps_within_budget() {
        let dir = TempDir::new().unwrap();
        let policy = BrickPolicy {
            refresh_threshold: 10,
            ..BrickPolicy::default()
        };
        let budget = 900;
        let pool = pool(&dir, 100_000, budget, policy);
        let brick_records = pool.brick_size() / RECORD as u64;
        let owner = OwnerToken::new();

        for round in 0..20u64 {
            let id = (round % 5) * brick_records * 7;
            for _ in 0..30 {
                drop(pool.acquire(id, OpType::Read, owner).unwrap());
            }
            assert_regions_valid(&pool, budget);
        }
        assert!(pool.stats().mapped_bytes <= budget);
    }

    #[test]
    fn test_concurrent_refreshes_keep_budget_and_data() {
        let dir = TempDir::new().unwrap();
        let policy = BrickPolicy {
            refresh_threshold: 3,
            ..BrickPolicy::default()
        };
        let budget = 900;
        let pool = pool(&dir, 20_000, budget, policy);

        thread::scope(|s| {
            for t in 0..4u64 {
                let pool = &pool;
                s.spawn(move || {
                    let owner = OwnerToken::new();
                    for round in 0..300u64 {
                        let id = (round * 37 + t * 4_001) % 20_000;
                        let guard = pool.acquire(id, OpType::Write, owner).unwrap();
                        guard.write_bytes(id, 0, &[1, t as u8]).unwrap();
                        drop(guard);
                        if round % 50 == 0 {
                            pool.refresh_bricks();
                        }
                    }
                });
            }
        });

        let stats = pool.stats();
        assert_eq!(stats.mapped_bytes, stats.mapped_bricks as u64 * stats.brick_size);
        assert_regions_valid(&pool, budget);

        let owner = OwnerToken::new();
        for t in 0..4u64 {
            for round in 0..300u64 {
                let id = (round * 37 + t * 4_001) % 20_000;
                let guard = pool.acquire(id, OpType::Read, owner).unwrap();
                assert!(guard.in_use(id).unwrap());
            }
        }
    }

    #[test]
    fn test_different_ids_do_not_block() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(pool(&dir, 100, 0, BrickPolicy::default()));
        let a = OwnerToken::new();
        let _held = pool.acquire(1, OpType::Write, a).unwrap();

        let other = {
            let pool = pool.clone();
            thread::spawn(move || {
                let guard = pool.acquire(2, OpType::Write, OwnerToken::new()).unwrap();
                guard.write_bytes(2, 0, &[1]).unwrap();
            })
        };
        other.join().unwrap();
    }

    #[test]
    fn test_same_id_serializes() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(pool(&dir, 100, 0, BrickPolicy::default()));
        let held = pool.acquire(7, OpType::Write, OwnerToken::new()).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let other = {
            let pool = pool.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let _guard = pool.acquire(7, OpType::Read, OwnerToken::new()).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(held);
        other.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(pool.stats().row_windows, 0);
    }

    #[test]
    fn test_acquire_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let pool = pool(&dir, 10, 1 << 16, BrickPolicy::default());
        pool.close().unwrap();
        pool.close().unwrap();
        assert!(pool.acquire(0, OpType::Read, OwnerToken::new()).is_err());
        assert!(pool.mapped_regions().is_empty());
    }
}
