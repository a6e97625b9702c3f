//! # In-Flight Registry
//!
//! Map of loads that are running or finished, keyed by source path (or by
//! any key that folds in how the file is loaded, e.g. path plus upload
//! format).
//!
//! The check and the insert happen under one lock, so two drains racing on
//! the same key cannot both dispatch it: the first caller gets a
//! [`Promise`] to fulfill, everyone after gets the shared future.
//!
//! ```text
//!   get_or_insert_pending(key)
//!       │
//!       ├─ live entry ───────────► Existing(SharedFuture)   no dispatch
//!       └─ missing / abandoned ──► Vacant(Promise)          caller dispatches
//! ```
//!
//! Entries stay after completion, so the registry doubles as the
//! already-loaded cache. Failed loads stay too; they are retried only after
//! [`InFlightRegistry::remove`] or [`InFlightRegistry::clear`].

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;

use lockstep_core::{promise, Promise, SharedFuture};
use parking_lot::Mutex;

/// Result of [`InFlightRegistry::get_or_insert_pending`].
pub enum Slot<V> {
    /// Another caller already owns the load.
    Existing(SharedFuture<V>),
    /// The caller now owns the load and must fulfill (or drop) the promise.
    Vacant(Promise<V>, SharedFuture<V>),
}

/// Race-free get-or-insert-pending map, keyed by source path unless `K`
/// says otherwise.
pub struct InFlightRegistry<V, K = PathBuf> {
    entries: Mutex<HashMap<K, SharedFuture<V>>>,
}

impl<V, K> Default for InFlightRegistry<V, K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V, K: Eq + Hash> InFlightRegistry<V, K> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live entry for `key`, or atomically inserts a pending one
    /// and hands its promise to the caller.
    ///
    /// An abandoned entry (its unit was discarded at shutdown) counts as
    /// missing and is replaced.
    pub fn get_or_insert_pending<Q>(&self, key: &Q) -> Slot<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            if !existing.is_abandoned() {
                return Slot::Existing(existing.clone());
            }
        }
        let (promise, future) = promise();
        entries.insert(key.to_owned(), future.clone());
        Slot::Vacant(promise, future)
    }

    /// The entry for `key`, if any.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<SharedFuture<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().get(key).cloned()
    }

    /// Entries, pending or finished.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries whose value has been published.
    #[must_use]
    pub fn completed_len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|future| future.is_ready())
            .count()
    }

    /// Forgets `key` so its next request loads it again.
    pub fn remove<Q>(&self, key: &Q) -> Option<SharedFuture<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().remove(key)
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_second_caller_gets_existing() {
        let registry = InFlightRegistry::<u32>::new();
        let path = Path::new("model.obj");

        let Slot::Vacant(promise, first) = registry.get_or_insert_pending(path) else {
            panic!("first caller must own the load");
        };
        let Slot::Existing(second) = registry.get_or_insert_pending(path) else {
            panic!("second caller must share the load");
        };

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.completed_len(), 0);
        promise.fulfill(9);
        assert_eq!(second.try_get(), Some(&9));
        assert!(first.ptr_eq(&second));
        assert_eq!(registry.completed_len(), 1);
    }

    #[test]
    fn test_abandoned_entry_replaced() {
        let registry = InFlightRegistry::<u32>::new();
        let path = Path::new("tex.png");

        if let Slot::Vacant(promise, _) = registry.get_or_insert_pending(path) {
            drop(promise);
        }
        assert!(matches!(
            registry.get_or_insert_pending(path),
            Slot::Vacant(..)
        ));
    }

    #[test]
    fn test_concurrent_callers_one_owner() {
        let registry = Arc::new(InFlightRegistry::<u32>::new());
        let owners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let owners = Arc::clone(&owners);
                thread::spawn(move || {
                    for i in 0..100 {
                        let path = PathBuf::from(format!("asset_{}.png", i % 20));
                        if let Slot::Vacant(promise, _) = registry.get_or_insert_pending(&path) {
                            owners.fetch_add(1, Ordering::Relaxed);
                            promise.fulfill(i);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(owners.load(Ordering::Relaxed), 20);
        assert_eq!(registry.len(), 20);
        assert_eq!(registry.completed_len(), 20);
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = InFlightRegistry::<u32>::new();
        let _ = registry.get_or_insert_pending(Path::new("a"));
        let _ = registry.get_or_insert_pending(Path::new("b"));

        assert!(registry.remove(Path::new("a")).is_some());
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_composite_key_separates_variants() {
        let registry = InFlightRegistry::<u32, (PathBuf, u8)>::new();
        let path = PathBuf::from("brick.png");

        assert!(matches!(
            registry.get_or_insert_pending(&(path.clone(), 0)),
            Slot::Vacant(..)
        ));
        assert!(matches!(
            registry.get_or_insert_pending(&(path.clone(), 1)),
            Slot::Vacant(..)
        ));
        assert!(matches!(
            registry.get_or_insert_pending(&(path, 0)),
            Slot::Existing(_)
        ));
        assert_eq!(registry.len(), 2);
    }
}
