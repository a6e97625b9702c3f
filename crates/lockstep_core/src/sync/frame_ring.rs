//! # Frame Ring
//!
//! N-slot ring of per-frame data shared by exactly two threads.
//!
//! ## Architecture
//!
//! ```text
//!              produced ──────────────┐
//!                                     ▼
//!   ┌────────┬────────┬────────┐
//!   │ slot 0 │ slot 1 │ slot 2 │   write slot = produced % N
//!   └────────┴────────┴────────┘   read  slot = consumed % N
//!       ▲
//!       └──── consumed
//!
//!   Update (writer) may proceed while  produced - consumed < N
//!   Render (reader) may proceed while  produced > consumed
//! ```
//!
//! With N = 1 this is the plain two-party handshake: update prepares one
//! frame, render consumes it, update prepares the next. Larger N lets update
//! run up to N frames ahead.
//!
//! ## Thread Safety
//!
//! The counters are the only state both threads contend on. A slot is only
//! ever handed to one side at a time, so the per-slot locks are uncontended;
//! they exist so that the publication of a slot's contents happens-before
//! the other side's access through the counter lock. A guard publishes
//! before its slot lock is released, so the other side may briefly block on
//! the slot lock right after being woken.

use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::CancellationToken;
use crate::error::{CoreError, CoreResult};

/// Largest supported ring depth.
const MAX_SLOTS: usize = 16;

struct Counters {
    produced: u64,
    consumed: u64,
    writing: bool,
    reading: bool,
}

impl Counters {
    #[inline]
    fn in_flight(&self) -> u64 {
        self.produced - self.consumed
    }
}

/// Multi-buffered frame data with a producer/consumer handshake.
pub struct FrameRing<T> {
    slots: Box<[Mutex<T>]>,
    counters: Mutex<Counters>,
    /// Update-side gate.
    writable: Condvar,
    /// Render-side gate.
    readable: Condvar,
}

impl<T: Default> FrameRing<T> {
    /// Creates a ring of `slot_count` default-initialized slots.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if `slot_count` is zero or larger
    /// than the supported maximum.
    pub fn new(slot_count: usize) -> CoreResult<Self> {
        Self::from_fn(slot_count, |_| T::default())
    }

    /// Clears both counters and resets every slot to its default value.
    ///
    /// Used on scene unload. Must not be called while either side holds a
    /// guard; doing so is a programming error (debug builds assert, release
    /// builds leave the ring untouched).
    pub fn reset(&self) {
        let mut counters = self.counters.lock();
        debug_assert!(
            !counters.writing && !counters.reading,
            "FrameRing::reset while a slot is checked out"
        );
        if counters.writing || counters.reading {
            tracing::error!("FrameRing::reset ignored: a slot is still checked out");
            return;
        }
        for slot in self.slots.iter() {
            *slot.lock() = T::default();
        }
        counters.produced = 0;
        counters.consumed = 0;
        drop(counters);
        self.writable.notify_all();
    }
}

impl<T> FrameRing<T> {
    /// Creates a ring whose slot `i` is initialized with `init(i)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if `slot_count` is zero or larger
    /// than the supported maximum.
    pub fn from_fn(slot_count: usize, mut init: impl FnMut(usize) -> T) -> CoreResult<Self> {
        if slot_count == 0 || slot_count > MAX_SLOTS {
            return Err(CoreError::InvalidConfig(format!(
                "frame ring needs 1..={MAX_SLOTS} slots, got {slot_count}"
            )));
        }
        let slots = (0..slot_count).map(|i| Mutex::new(init(i))).collect();
        Ok(Self {
            slots,
            counters: Mutex::new(Counters {
                produced: 0,
                consumed: 0,
                writing: false,
                reading: false,
            }),
            writable: Condvar::new(),
            readable: Condvar::new(),
        })
    }

    /// Number of slots (pipeline depth).
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Frames published so far.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.counters.lock().produced
    }

    /// Frames released by the reader so far.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.counters.lock().consumed
    }

    /// Frames published but not yet released by the reader.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.counters.lock().in_flight()
    }

    fn depth(&self) -> u64 {
        self.slots.len() as u64
    }

    fn can_write(&self, counters: &Counters) -> bool {
        !counters.writing && counters.in_flight() < self.depth()
    }

    /// Blocks until the writer may claim a slot (the update-side gate).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token is cancelled first.
    pub fn wait_writable(&self, token: &CancellationToken) -> CoreResult<()> {
        let mut counters = self.counters.lock();
        self.wait_until_writable(&mut counters, token)
    }

    fn wait_until_writable(
        &self,
        counters: &mut MutexGuard<'_, Counters>,
        token: &CancellationToken,
    ) -> CoreResult<()> {
        debug_assert!(!counters.writing, "second concurrent FrameRing writer");
        loop {
            if token.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if self.can_write(counters) {
                return Ok(());
            }
            self.writable.wait_for(counters, token.poll_interval());
        }
    }

    /// Claims the next slot for writing, blocking while the ring is full.
    ///
    /// The slot is published to the reader when the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token is cancelled first.
    pub fn begin_write(&self, token: &CancellationToken) -> CoreResult<FrameWriteGuard<'_, T>> {
        let mut counters = self.counters.lock();
        self.wait_until_writable(&mut counters, token)?;
        counters.writing = true;
        let frame_number = counters.produced;
        drop(counters);

        let slot_index = (frame_number % self.depth()) as usize;
        tracing::trace!(frame_number, slot_index, "frame slot claimed for write");
        Ok(FrameWriteGuard {
            ring: self,
            frame_number,
            slot_index,
            slot: self.slots[slot_index].lock(),
        })
    }

    fn can_read(counters: &Counters) -> bool {
        !counters.reading && counters.produced > counters.consumed
    }

    fn claim_read(&self, mut counters: MutexGuard<'_, Counters>) -> FrameReadGuard<'_, T> {
        counters.reading = true;
        let frame_number = counters.consumed;
        drop(counters);

        let slot_index = (frame_number % self.depth()) as usize;
        tracing::trace!(frame_number, slot_index, "frame slot claimed for read");
        FrameReadGuard {
            ring: self,
            frame_number,
            slot_index,
            slot: self.slots[slot_index].lock(),
        }
    }

    /// Claims the oldest published slot, blocking until one is available
    /// (the render-side gate).
    ///
    /// The slot is handed back to the writer when the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token is cancelled first.
    pub fn begin_read(&self, token: &CancellationToken) -> CoreResult<FrameReadGuard<'_, T>> {
        let mut counters = self.counters.lock();
        debug_assert!(!counters.reading, "second concurrent FrameRing reader");
        loop {
            if token.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if Self::can_read(&counters) {
                return Ok(self.claim_read(counters));
            }
            self.readable.wait_for(&mut counters, token.poll_interval());
        }
    }

    /// Claims the oldest published slot if one is available right now.
    #[must_use]
    pub fn try_begin_read(&self) -> Option<FrameReadGuard<'_, T>> {
        let counters = self.counters.lock();
        if Self::can_read(&counters) {
            Some(self.claim_read(counters))
        } else {
            None
        }
    }

    /// Wakes every thread blocked on either gate so it re-checks its token.
    pub fn release_waiters(&self) {
        self.writable.notify_all();
        self.readable.notify_all();
    }

    fn publish(&self) {
        let mut counters = self.counters.lock();
        counters.produced += 1;
        counters.writing = false;
        drop(counters);
        self.readable.notify_all();
    }

    fn release(&self) {
        let mut counters = self.counters.lock();
        counters.consumed += 1;
        counters.reading = false;
        drop(counters);
        self.writable.notify_all();
    }
}

/// Exclusive access to the slot being written. Publishes on drop.
pub struct FrameWriteGuard<'a, T> {
    ring: &'a FrameRing<T>,
    frame_number: u64,
    slot_index: usize,
    slot: MutexGuard<'a, T>,
}

impl<T> FrameWriteGuard<'_, T> {
    /// Monotonic number of the frame being written (0-based).
    #[inline]
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Index of the slot being written.
    #[inline]
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }
}

impl<T> Deref for FrameWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot
    }
}

impl<T> DerefMut for FrameWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.slot
    }
}

impl<T> Drop for FrameWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.ring.publish();
    }
}

/// Shared access to the slot being read. Hands the slot back on drop.
pub struct FrameReadGuard<'a, T> {
    ring: &'a FrameRing<T>,
    frame_number: u64,
    slot_index: usize,
    slot: MutexGuard<'a, T>,
}

impl<T> FrameReadGuard<'_, T> {
    /// Monotonic number of the frame being read (0-based).
    #[inline]
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Index of the slot being read.
    #[inline]
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }
}

impl<T> Deref for FrameReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot
    }
}

impl<T> Drop for FrameReadGuard<'_, T> {
    fn drop(&mut self) {
        self.ring.release();
    }
}
