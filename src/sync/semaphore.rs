//! Counting semaphore with first-come admission.
//!
//! Waiters take a ticket on arrival and are admitted strictly in ticket order,
//! so a caller can never be passed over by later arrivals while it waits.
//! A caller that gives up on a timeout leaves its ticket behind, and the line
//! moves past it.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug)]
pub(crate) struct Semaphore {
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Debug)]
struct State {
    permits: usize,
    next_ticket: u64,
    serving: u64,
    /// Tickets of callers that timed out before their turn
    abandoned: Vec<u64>,
}

impl State {
    #[inline(always)]
    fn has_waiters(&self) -> bool {
        self.next_ticket != self.serving
    }

    fn skip_abandoned(&mut self) {
        while let Some(i) = self.abandoned.iter().position(|&t| t == self.serving) {
            self.abandoned.swap_remove(i);
            self.serving += 1;
        }
    }
}

impl Semaphore {
    #[inline]
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(State {
                permits,
                next_ticket: 0,
                serving: 0,
                abandoned: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Blocks until a permit is available and this caller is first in line.
    pub(crate) fn acquire(&self) {
        let mut state = self.lock();

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while ticket != state.serving || state.permits == 0 {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.serving += 1;
        state.permits -= 1;
        self.pass_on(state);
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
    ///
    /// Returns `true` if a permit was taken.
    pub(crate) fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while ticket != state.serving || state.permits == 0 {
            let now = Instant::now();
            if now >= deadline {
                state.abandoned.push(ticket);
                self.pass_on(state);
                return false;
            }

            let (guard, _) = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        state.serving += 1;
        state.permits -= 1;
        self.pass_on(state);
        true
    }

    /// Takes a permit only if one is free and nobody is queued for it.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut state = self.lock();

        if state.permits == 0 || state.has_waiters() {
            return false;
        }

        state.permits -= 1;
        true
    }

    pub(crate) fn release(&self) {
        let mut state = self.lock();
        state.permits += 1;
        drop(state);

        self.cond.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.lock().permits
    }

    /// Moves the line past abandoned tickets and wakes the waiters if the
    /// next one may already be admissible.
    fn pass_on(&self, mut state: MutexGuard<'_, State>) {
        state.skip_abandoned();

        let wake = state.permits > 0 && state.has_waiters();
        drop(state);

        if wake {
            self.cond.notify_all();
        }
    }

    #[inline(always)]
    fn lock(&self) -> MutexGuard<'_, State> {
        // Only counters live behind the mutex, they stay consistent even if
        // a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod semaphore_tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    #[test]
    fn counts_permits() {
        let sem = Semaphore::new(2);

        sem.acquire();
        assert_eq!(sem.available(), 1);
        assert!(sem.try_acquire());
        assert_eq!(sem.available(), 0);
        assert!(!sem.try_acquire());

        sem.release();
        sem.release();
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Semaphore::new(0);
        let passed = AtomicUsize::new(0);

        crossbeam::scope(|s| {
            s.spawn(|_| {
                sem.acquire();
                passed.fetch_add(1, Ordering::SeqCst);
            });

            thread::sleep(Duration::from_millis(50));
            assert_eq!(passed.load(Ordering::SeqCst), 0);

            sem.release();
        })
        .unwrap();

        assert_eq!(passed.load(Ordering::SeqCst), 1);
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn admits_in_arrival_order() {
        let sem = Semaphore::new(0);
        let order = Mutex::new(Vec::new());

        crossbeam::scope(|s| {
            for id in 0..4 {
                let (sem, order) = (&sem, &order);
                s.spawn(move |_| {
                    sem.acquire();
                    order.lock().unwrap().push(id);
                });
                // Let each waiter take its ticket before the next one starts.
                thread::sleep(Duration::from_millis(30));
            }

            for _ in 0..4 {
                sem.release();
                thread::sleep(Duration::from_millis(10));
            }
        })
        .unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn try_acquire_respects_queued_waiters() {
        let sem = Semaphore::new(0);

        crossbeam::scope(|s| {
            s.spawn(|_| sem.acquire());
            thread::sleep(Duration::from_millis(50));

            // A permit appears, but the parked waiter owns the first ticket.
            {
                let mut state = sem.lock();
                state.permits += 1;
                assert!(state.has_waiters());
            }
            assert!(!sem.try_acquire());
            sem.cond.notify_all();
        })
        .unwrap();

        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn acquire_timeout_gives_up_its_turn() {
        let sem = Semaphore::new(0);
        assert!(!sem.acquire_timeout(Duration::from_millis(20)));

        // The abandoned ticket does not hold up later callers.
        sem.release();
        assert!(sem.try_acquire());

        crossbeam::scope(|s| {
            let first = s.spawn(|_| sem.acquire());
            thread::sleep(Duration::from_millis(30));

            // Queued behind `first`.
            assert!(!sem.acquire_timeout(Duration::from_millis(20)));

            sem.release();
            first.join().unwrap();
        })
        .unwrap();

        sem.release();
        assert!(sem.try_acquire());
        assert!(!sem.acquire_timeout(Duration::ZERO));
    }

    #[test]
    fn acquire_timeout_takes_released_permit() {
        let sem = Semaphore::new(0);

        crossbeam::scope(|s| {
            let waiter = s.spawn(|_| sem.acquire_timeout(Duration::from_secs(5)));
            thread::sleep(Duration::from_millis(30));
            sem.release();

            assert!(waiter.join().unwrap());
        })
        .unwrap();

        assert_eq!(sem.available(), 0);
    }
}
