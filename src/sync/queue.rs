//! Fixed-capacity blocking FIFO shared by many producers and consumers.

use super::semaphore::Semaphore;
use crossbeam::queue::ArrayQueue;
use std::{fmt, time::Duration};

/// Blocking bounded queue.
///
/// `push` waits for a free slot, `pop` waits for a filled one. Both sides
/// queue up in arrival order, so no producer or consumer starves while the
/// others keep making progress. The ring itself is lock-free; the two
/// counting semaphores only gate access to it.
///
/// # Examples
/// ```
/// use rwhttpd::sync::BoundedQueue;
///
/// let queue = BoundedQueue::new(2);
/// queue.push("a");
/// queue.push("b");
/// assert_eq!(queue.try_push("c"), Err("c"));
///
/// assert_eq!(queue.pop(), "a");
/// assert_eq!(queue.pop(), "b");
/// ```
pub struct BoundedQueue<T> {
    ring: ArrayQueue<T>,
    free_slots: Semaphore,
    filled_slots: Semaphore,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    ///
    /// # Panics
    /// If `capacity` is `0`.
    #[track_caller]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");

        Self {
            ring: ArrayQueue::new(capacity),
            free_slots: Semaphore::new(capacity),
            filled_slots: Semaphore::new(0),
        }
    }

    /// Appends `item`, blocking while the queue is full.
    pub fn push(&self, item: T) {
        self.free_slots.acquire();
        self.insert(item);
    }

    /// Appends `item` only if a slot is free right now.
    ///
    /// Gives the item back when the queue is full or producers are already
    /// waiting for space.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        if !self.free_slots.try_acquire() {
            return Err(item);
        }

        self.insert(item);
        Ok(())
    }

    /// Appends `item`, waiting at most `timeout` for a free slot.
    ///
    /// Gives the item back if no slot freed up in time.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        if !self.free_slots.acquire_timeout(timeout) {
            return Err(item);
        }

        self.insert(item);
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        self.filled_slots.acquire();

        // A filled-slot permit is only released after its item is in the ring.
        let item = match self.ring.pop() {
            Some(item) => item,
            None => unreachable!("filled slot permit without an item"),
        };

        self.free_slots.release();
        item
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    fn insert(&self, item: T) {
        if self.ring.push(item).is_err() {
            unreachable!("free slot permit without room in the ring");
        }
        self.filled_slots.release();
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
