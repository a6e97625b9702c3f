//! # Shared Future
//!
//! A one-shot value that many threads can wait on.
//!
//! [`promise()`] returns the producing half ([`Promise`]) and the first
//! consuming half ([`SharedFuture`]). Consumers are cheap to clone; every
//! clone observes the same value once it is fulfilled.
//!
//! ```text
//!   Promise::fulfill(v) ──► OnceLock<Resolution> ──► try_get()   (lock-free)
//!                                │
//!                                └─ notify_all ────► wait()      (blocking)
//! ```
//!
//! Dropping a [`Promise`] without fulfilling it marks the future abandoned,
//! so waiters are released instead of hanging forever.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::CancellationToken;
use crate::error::{CoreError, CoreResult};

enum Resolution<T> {
    Ready(T),
    Abandoned,
}

struct Shared<T> {
    resolution: OnceLock<Resolution<T>>,
    lock: Mutex<()>,
    cond: Condvar,
}

impl<T> Shared<T> {
    fn resolve(&self, resolution: Resolution<T>) -> bool {
        let stored = self.resolution.set(resolution).is_ok();
        if stored {
            // Taking the lock orders the store before any waiter's re-check.
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
        stored
    }

    fn value(&self) -> Option<&T> {
        match self.resolution.get() {
            Some(Resolution::Ready(value)) => Some(value),
            _ => None,
        }
    }
}

/// Creates a connected promise/future pair.
#[must_use]
pub fn promise<T>() -> (Promise<T>, SharedFuture<T>) {
    let shared = Arc::new(Shared {
        resolution: OnceLock::new(),
        lock: Mutex::new(()),
        cond: Condvar::new(),
    });
    (
        Promise {
            shared: Some(Arc::clone(&shared)),
        },
        SharedFuture { shared },
    )
}

/// Producing half of a [`SharedFuture`].
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Promise<T> {
    /// Publishes the value and wakes every waiter.
    pub fn fulfill(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(Resolution::Ready(value));
        }
    }

    /// Returns another consumer for this promise's value.
    #[must_use]
    pub fn future(&self) -> Option<SharedFuture<T>> {
        self.shared
            .as_ref()
            .map(|shared| SharedFuture { shared: Arc::clone(shared) })
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            if shared.resolve(Resolution::Abandoned) {
                tracing::debug!("promise dropped without a value");
            }
        }
    }
}

/// Consuming half of a one-shot value. Clone freely.
pub struct SharedFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFuture")
            .field("ready", &self.is_ready())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

impl<T> SharedFuture<T> {
    /// A future that is already fulfilled.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (promise, future) = promise();
        promise.fulfill(value);
        future
    }

    /// Whether both handles observe the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether a value has been published.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.value().is_some()
    }

    /// Whether the promise was dropped without a value.
    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        matches!(self.shared.resolution.get(), Some(Resolution::Abandoned))
    }

    /// The value, if already published. Never blocks.
    #[inline]
    #[must_use]
    pub fn try_get(&self) -> Option<&T> {
        self.shared.value()
    }

    /// Blocks until the future resolves.
    ///
    /// Returns `None` if the promise was abandoned.
    #[must_use]
    pub fn wait(&self) -> Option<&T> {
        if self.shared.resolution.get().is_none() {
            let mut guard = self.shared.lock.lock();
            while self.shared.resolution.get().is_none() {
                self.shared.cond.wait(&mut guard);
            }
        }
        self.shared.value()
    }

    /// Blocks until the future resolves or `timeout` elapses.
    ///
    /// Returns `None` on timeout or abandonment.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<&T> {
        if self.shared.resolution.get().is_none() {
            let deadline = Instant::now() + timeout;
            let mut guard = self.shared.lock.lock();
            while self.shared.resolution.get().is_none() {
                if self
                    .shared
                    .cond
                    .wait_until(&mut guard, deadline)
                    .timed_out()
                {
                    break;
                }
            }
        }
        self.shared.value()
    }

    /// Blocks until the future resolves, re-checking `token` every poll
    /// interval.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token is cancelled before the
    /// future resolves. An abandoned promise yields `Ok(None)`.
    pub fn wait_cancellable(&self, token: &CancellationToken) -> CoreResult<Option<&T>> {
        if self.shared.resolution.get().is_none() {
            let mut guard = self.shared.lock.lock();
            while self.shared.resolution.get().is_none() {
                if token.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                self.shared.cond.wait_for(&mut guard, token.poll_interval());
            }
        }
        Ok(self.shared.value())
    }
}
