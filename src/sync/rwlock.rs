//! Reader-writer lock with a configurable admission policy.
//!
//! Unlike [`std::sync::RwLock`], the policy deciding who goes next when both
//! readers and writers are waiting is explicit and chosen at creation time:
//!
//! | Priority  | Reader waits while                                   | Writer waits while                                       |
//! |-----------|------------------------------------------------------|----------------------------------------------------------|
//! | `Readers` | write-held                                           | held                                                     |
//! | `Writers` | write-held, or a writer is waiting                   | held                                                     |
//! | `NWay(n)` | write-held, or a writer waits and the round admitted `n` readers | held, or readers wait and the round admitted fewer than `n` |
//!
//! The "round" counts readers admitted since a writer last held the lock. In
//! `NWay` mode this bounds starvation on both sides: a waiting writer gets the
//! lock after at most `n` further readers, and a writer hands over to waiting
//! readers before another writer may follow.
//!
//! Every release that frees the lock wakes all waiters, since which of them is
//! admissible next depends on the policy and has to be re-evaluated by each.

use crate::limits::Priority;
use std::{
    fmt,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

/// Who currently holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    /// Nobody
    Free,
    /// One or more readers
    Read,
    /// Exactly one writer
    Write,
}

/// Point-in-time view of the lock bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub holder: Holder,
    pub active_readers: usize,
    pub waiting_readers: usize,
    pub waiting_writers: usize,
    /// Readers admitted since the last writer (only advanced in `NWay` mode)
    pub round: usize,
}

/// Reader-writer lock with [`Priority`]-driven admission.
///
/// # Examples
/// ```
/// use rwhttpd::{limits::Priority, sync::PriorityRwLock};
///
/// let lock = PriorityRwLock::new(Priority::NWay(4));
///
/// {
///     let _a = lock.read();
///     let _b = lock.read(); // readers share the lock
/// }
///
/// let _w = lock.write(); // exclusive
/// ```
///
/// # Panics
/// Releasing a lock that is not held in the matching mode is a programming
/// error and panics.
pub struct PriorityRwLock {
    priority: Priority,
    state: Mutex<LockState>,
    cond: Condvar,
}

impl PriorityRwLock {
    /// Creates a free lock.
    ///
    /// A quota of `0` in [`Priority::NWay`] is raised to `1`, otherwise
    /// waiting writers would block every reader forever.
    pub fn new(priority: Priority) -> Self {
        let priority = match priority {
            Priority::NWay(0) => Priority::NWay(1),
            other => other,
        };

        Self {
            priority,
            state: Mutex::new(LockState {
                holder: Holder::Free,
                active_readers: 0,
                waiting_readers: 0,
                waiting_writers: 0,
                round: 0,
            }),
            cond: Condvar::new(),
        }
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Reader quota per round, `None` unless the lock is `NWay`.
    #[inline]
    pub fn reader_quota(&self) -> Option<usize> {
        match self.priority {
            Priority::NWay(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn state(&self) -> LockState {
        *self.lock_state()
    }

    /// Blocks until shared access is granted under the lock's policy.
    pub fn reader_lock(&self) {
        let mut state = self.lock_state();
        state.waiting_readers += 1;

        while self.reader_must_wait(&state) {
            state = self.wait(state);
        }

        state.waiting_readers -= 1;
        state.active_readers += 1;
        if let Priority::NWay(_) = self.priority {
            state.round += 1;
        }
        state.holder = Holder::Read;
    }

    /// Releases shared access; the last reader out frees the lock.
    #[track_caller]
    pub fn reader_unlock(&self) {
        let mut state = self.lock_state();
        assert!(
            state.holder == Holder::Read && state.active_readers > 0,
            "reader_unlock on a lock that is not read-held"
        );

        state.active_readers -= 1;
        if state.active_readers == 0 {
            state.holder = Holder::Free;
            drop(state);

            self.cond.notify_all();
        }
    }

    /// Blocks until exclusive access is granted under the lock's policy.
    pub fn writer_lock(&self) {
        let mut state = self.lock_state();
        state.waiting_writers += 1;

        while self.writer_must_wait(&state) {
            state = self.wait(state);
        }

        state.waiting_writers -= 1;
        if let Priority::NWay(_) = self.priority {
            state.round = 0;
        }
        state.holder = Holder::Write;
    }

    /// Releases exclusive access.
    #[track_caller]
    pub fn writer_unlock(&self) {
        let mut state = self.lock_state();
        assert!(
            state.holder == Holder::Write,
            "writer_unlock on a lock that is not write-held"
        );

        state.holder = Holder::Free;
        drop(state);

        self.cond.notify_all();
    }

    /// Acquires shared access, released when the guard drops.
    #[inline]
    pub fn read(&self) -> ReadGuard<'_> {
        self.reader_lock();
        ReadGuard { lock: self }
    }

    /// Acquires exclusive access, released when the guard drops.
    #[inline]
    pub fn write(&self) -> WriteGuard<'_> {
        self.writer_lock();
        WriteGuard { lock: self }
    }

    #[inline]
    fn reader_must_wait(&self, state: &LockState) -> bool {
        if state.holder == Holder::Write {
            return true;
        }

        match self.priority {
            Priority::Readers => false,
            Priority::Writers => state.waiting_writers > 0,
            Priority::NWay(quota) => state.waiting_writers > 0 && state.round >= quota,
        }
    }

    #[inline]
    fn writer_must_wait(&self, state: &LockState) -> bool {
        if state.holder != Holder::Free {
            return true;
        }

        match self.priority {
            Priority::NWay(quota) => state.waiting_readers > 0 && state.round < quota,
            Priority::Readers | Priority::Writers => false,
        }
    }

    #[inline(always)]
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline(always)]
    fn wait<'a>(&self, state: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.cond
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PriorityRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityRwLock")
            .field("priority", &self.priority)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for PriorityRwLock {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        debug_assert!(
            state.holder == Holder::Free
                && state.waiting_readers == 0
                && state.waiting_writers == 0,
            "PriorityRwLock dropped while in use: {state:?}"
        );
    }
}

/// Shared access to a [`PriorityRwLock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a PriorityRwLock,
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.reader_unlock();
    }
}

/// Exclusive access to a [`PriorityRwLock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a PriorityRwLock,
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.writer_unlock();
    }
}
