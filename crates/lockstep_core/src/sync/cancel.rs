//! Global stop flag shared by every long-lived thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long a cancellable wait sleeps before re-checking
/// the token.
pub const DEFAULT_WAIT_POLL: Duration = Duration::from_millis(5);

struct TokenState {
    cancelled: AtomicBool,
    poll_interval: Duration,
}

/// Cloneable cancellation flag.
///
/// Cancelling is one-way. Blocking waits in this crate take a token and
/// return [`CoreError::Cancelled`](crate::CoreError::Cancelled) once it is
/// set, waking at least every [`poll_interval`](Self::poll_interval).
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a token with the default poll interval.
    #[must_use]
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_WAIT_POLL)
    }

    /// Creates a token whose waits re-check the flag every `poll_interval`.
    ///
    /// A zero interval is bumped to one millisecond.
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                poll_interval: poll_interval.max(Duration::from_millis(1)),
            }),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on any clone.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Longest time a cancellable wait blocks between checks.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.state.poll_interval
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("poll_interval", &self.state.poll_interval)
            .finish()
    }
}
