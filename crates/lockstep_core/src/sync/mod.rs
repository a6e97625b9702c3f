//! # Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Update thread:  WRITE frame N+1 while ...
//! Render thread:  READ  frame N
//! Load workers:   PUBLISH results that many owners wait on
//! Shutdown:       every one of them must let go, promptly
//! ```
//!
//! ## The Solution
//!
//! - [`FrameRing`]: N slots, two monotonic counters, ownership alternates
//!   per slot under the handshake.
//! - [`SharedFuture`]: single assignment, many readers, lock-free reads
//!   after publication.
//! - [`CancellationToken`]: one flag threaded through every wait.

mod cancel;
mod frame_ring;
mod shared_future;

pub use cancel::{CancellationToken, DEFAULT_WAIT_POLL};
pub use frame_ring::{FrameReadGuard, FrameRing, FrameWriteGuard};
pub use shared_future::{promise, Promise, SharedFuture};
