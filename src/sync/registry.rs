//! Path-keyed registry of reader-writer locks.

use super::rwlock::PriorityRwLock;
use crate::limits::LockLimits;
use std::{
    collections::HashMap,
    fmt,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::trace;

/// Shared reference to the lock guarding one path.
///
/// Handles for the same path always point at the same lock.
#[derive(Clone)]
pub struct LockHandle(Arc<PriorityRwLock>);

impl LockHandle {
    #[inline]
    pub fn same_lock(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for LockHandle {
    type Target = PriorityRwLock;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps each resource path to exactly one [`PriorityRwLock`].
///
/// The registry mutex only covers the map lookup; callers block on the
/// returned lock after it has been released. While the server runs the
/// registry only grows. [`remove`](Self::remove) needs exclusive access,
/// which only the owner has once every worker is gone.
///
/// # Examples
/// ```
/// use rwhttpd::{limits::LockLimits, sync::{LockHandle, LockRegistry}};
///
/// let registry = LockRegistry::new(LockLimits::default());
///
/// let a = registry.resolve_or_create("notes.txt");
/// let b = registry.resolve_or_create("notes.txt");
/// assert!(LockHandle::same_lock(&a, &b));
///
/// let _read = a.read();
/// ```
pub struct LockRegistry {
    entries: Mutex<HashMap<String, LockHandle>>,
    limits: LockLimits,
}

impl LockRegistry {
    pub fn new(limits: LockLimits) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Returns the lock for `path`, creating it on first use.
    pub fn resolve_or_create(&self, path: &str) -> LockHandle {
        let mut entries = self.entries();

        if let Some(handle) = entries.get(path) {
            return handle.clone();
        }

        trace!(path, priority = ?self.limits.priority, "new path lock");

        let handle = LockHandle(Arc::new(PriorityRwLock::new(self.limits.priority)));
        entries.insert(path.to_owned(), handle.clone());
        handle
    }

    /// Returns the lock for `path` if one was created.
    pub fn lookup(&self, path: &str) -> Option<LockHandle> {
        self.entries().get(path).cloned()
    }

    /// Drops the lock for `path`.
    ///
    /// Gives the handle back instead while anyone else still holds one, so a
    /// lock in use is never detached from its path.
    pub fn remove(&mut self, path: &str) -> Result<(), LockHandle> {
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        match entries.remove(path) {
            Some(handle) if Arc::strong_count(&handle.0) > 1 => {
                entries.insert(path.to_owned(), handle.clone());
                Err(handle)
            }
            _ => Ok(()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Snapshot of every registered path, in no particular order.
    pub fn paths(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    #[inline(always)]
    fn entries(&self) -> MutexGuard<'_, HashMap<String, LockHandle>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LockRegistry {
    #[inline]
    fn default() -> Self {
        Self::new(LockLimits::default())
    }
}

impl fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("paths", &self.len())
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::limits::Priority;

    #[test]
    fn one_lock_per_path() {
        let registry = LockRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.lookup("a").is_none());

        let a1 = registry.resolve_or_create("a");
        let a2 = registry.resolve_or_create("a");
        let b = registry.resolve_or_create("b");
        let a_upper = registry.resolve_or_create("A");

        assert!(LockHandle::same_lock(&a1, &a2));
        assert!(!LockHandle::same_lock(&a1, &b));
        assert!(!LockHandle::same_lock(&a1, &a_upper));
        assert!(LockHandle::same_lock(&a1, &registry.lookup("a").unwrap()));

        let mut paths = registry.paths();
        paths.sort();
        assert_eq!(paths, ["A", "a", "b"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn uses_configured_priority() {
        let registry = LockRegistry::new(LockLimits {
            priority: Priority::Writers,
            ..LockLimits::default()
        });

        assert_eq!(registry.resolve_or_create("x").priority(), Priority::Writers);
        assert_eq!(
            LockRegistry::default().resolve_or_create("x").reader_quota(),
            Some(4)
        );
    }

    #[test]
    fn concurrent_resolution() {
        let registry = LockRegistry::default();
        let handles = Mutex::new(Vec::new());

        crossbeam::scope(|s| {
            for _ in 0..8 {
                s.spawn(|_| {
                    let handle = registry.resolve_or_create("shared");
                    handles.lock().unwrap().push(handle);
                });
            }
        })
        .unwrap();

        let handles = handles.into_inner().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(handles.iter().all(|h| LockHandle::same_lock(h, &handles[0])));
    }

    #[test]
    fn blocking_on_one_path_leaves_others_free() {
        let registry = LockRegistry::default();
        let held = registry.resolve_or_create("busy");
        let _write = held.write();

        crossbeam::scope(|s| {
            let other = s.spawn(|_| {
                let handle = registry.resolve_or_create("idle");
                let _write = handle.write();
                drop(registry.resolve_or_create("busy2").read());
            });

            // Neither the registry nor the other path is blocked by "busy".
            other.join().unwrap();
        })
        .unwrap();

        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn remove_refuses_locks_in_use() {
        let mut registry = LockRegistry::default();
        let handle = registry.resolve_or_create("a");
        registry.resolve_or_create("b");

        assert!(registry.remove("a").is_err());
        assert!(registry.lookup("a").is_some());

        drop(handle);
        assert!(registry.remove("a").is_ok());
        assert!(registry.remove("missing").is_ok());
        assert_eq!(registry.paths(), ["b"]);
    }
}
