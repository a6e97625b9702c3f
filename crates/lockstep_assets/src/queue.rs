//! # Load Queues
//!
//! A [`LoadQueue`] is a FIFO of pending requests plus the dedup set of keys
//! seen in the current pending batch. Every request is recorded so each
//! requester gets a result; the dedup set decides which requests start a
//! load. Draining hands out the whole batch as a [`LoadBatch`] and clears
//! the set.
//!
//! ```text
//!   push(a, r0) push(b, r1) push(a, r2)
//!       │
//!       ▼ drain()
//!   unique:   [a, b]               one load each
//!   requests: [(0, r0), (1, r1), (0, r2)]
//! ```

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::path::PathBuf;

/// Pending requests of one scope and the unique keys among them.
#[derive(Debug)]
pub struct LoadQueue<T, K = PathBuf> {
    pending: VecDeque<(usize, T)>,
    unique: Vec<K>,
    index: HashMap<K, usize>,
}

/// A drained queue.
#[derive(Debug)]
pub struct LoadBatch<T, K = PathBuf> {
    /// Distinct keys in first-seen order; each needs exactly one load.
    pub unique: Vec<K>,
    /// Requests in FIFO order, tagged with the position of their key in
    /// `unique`.
    pub requests: Vec<(usize, T)>,
}

impl<T, K> LoadBatch<T, K> {
    /// Requests served by another request's load.
    #[must_use]
    pub fn shared_requests(&self) -> usize {
        self.requests.len() - self.unique.len()
    }
}

impl<T, K> Default for LoadQueue<T, K> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            unique: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T, K: Eq + Hash + Clone> LoadQueue<T, K> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `request`. Returns true if `key` is new to this batch.
    pub fn push(&mut self, key: K, request: T) -> bool {
        let (slot, first) = match self.index.get(&key) {
            Some(&slot) => (slot, false),
            None => {
                let slot = self.unique.len();
                self.index.insert(key.clone(), slot);
                self.unique.push(key);
                (slot, true)
            }
        };
        self.pending.push_back((slot, request));
        first
    }

    /// Iterates over pending requests without draining.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pending.iter().map(|(_, request)| request)
    }

    /// Pending request count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes the whole batch in FIFO order and resets the dedup set.
    pub fn drain(&mut self) -> LoadBatch<T, K> {
        self.index.clear();
        LoadBatch {
            unique: std::mem::take(&mut self.unique),
            requests: self.pending.drain(..).collect(),
        }
    }
}
