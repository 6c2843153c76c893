//! Reentrant window lock keyed by an explicit owner token
//!
//! A window is held by one owner at a time. The owner may lock it again
//! (nested acquisition inside one logical operation); every other owner
//! blocks on a condition variable until the depth drops back to zero.
//!
//! Blocked owners are served in arrival order: each takes a ticket, and a
//! newcomer never jumps ahead of a queued waiter.

use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a logical caller (a transaction, a worker, a request)
///
/// Tokens are plain values handed to every acquisition; nothing is inferred
/// from the calling thread. Two threads must not use the same token at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    /// Allocate a process-unique token
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a caller-chosen identifier (e.g. a transaction id)
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct LockState {
    owner: Option<OwnerToken>,
    depth: u32,
    waiting: u32,
    next_ticket: u64,
    serving: u64,
}

impl LockState {
    /// Take or re-enter the lock without queueing, if that is fair
    fn try_take(&mut self, owner: OwnerToken) -> bool {
        match self.owner {
            Some(current) if current == owner => {
                self.depth += 1;
                true
            }
            None if self.waiting == 0 => {
                self.owner = Some(owner);
                self.depth = 1;
                true
            }
            _ => false,
        }
    }
}

/// Reentrant, owner-exclusive lock
#[derive(Debug, Default)]
pub struct OwnerLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl OwnerLock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `owner` holds the lock
    pub fn lock(&self, owner: OwnerToken) {
        let mut state = self.state.lock();
        if state.try_take(owner) {
            return;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting += 1;
        while state.owner.is_some() || state.serving != ticket {
            self.released.wait(&mut state);
        }
        state.serving += 1;
        state.waiting -= 1;
        state.owner = Some(owner);
        state.depth = 1;
    }

    /// Take the lock if it is free or already held by `owner`
    pub fn try_lock(&self, owner: OwnerToken) -> bool {
        self.state.lock().try_take(owner)
    }

    /// Drop one level of `owner`'s hold. Returns true when the lock became free.
    pub fn unlock(&self, owner: OwnerToken) -> Result<bool> {
        let mut state = self.state.lock();
        if state.owner != Some(owner) {
            return Err(Error::storage(format!(
                "owner {} released a window lock it does not hold",
                owner.id()
            )));
        }
        state.depth -= 1;
        if state.depth > 0 {
            return Ok(false);
        }
        state.owner = None;
        if state.waiting > 0 {
            // only the next ticket proceeds; the rest wait again
            self.released.notify_all();
        }
        Ok(true)
    }

    /// Threads blocked in [`lock`](Self::lock)
    pub fn waiting(&self) -> u32 {
        self.state.lock().waiting
    }

    /// True while anyone holds the lock
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Nesting depth of the current holder (0 when free)
    pub fn depth(&self) -> u32 {
        self.state.lock().depth
    }

    /// Current holder
    pub fn holder(&self) -> Option<OwnerToken> {
        self.state.lock().owner
    }
}
