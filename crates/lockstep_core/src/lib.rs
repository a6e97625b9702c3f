//! # Lockstep Core
//!
//! Threading primitives shared by the update, render and load threads.
//!
//! ## Building Blocks
//!
//! ```text
//!   CancellationToken ──┬──> FrameRing<T>     (update ⇄ render handshake)
//!                       ├──> SharedFuture<T>  (one producer, many readers)
//!                       └──> WorkerPool       (units of work + in-flight count)
//! ```
//!
//! Every blocking wait takes a [`CancellationToken`] and is written as
//! "wait until (condition OR cancelled)". Waits wake at least once per
//! poll interval, so a cancel that nobody notifies is still observed.
//!
//! ## Example
//!
//! ```rust
//! use lockstep_core::{CancellationToken, FrameRing};
//!
//! let token = CancellationToken::new();
//! let ring: FrameRing<u32> = FrameRing::new(2).unwrap();
//!
//! {
//!     let mut slot = ring.begin_write(&token).unwrap();
//!     *slot = 7;
//! } // published
//!
//! let frame = ring.begin_read(&token).unwrap();
//! assert_eq!(*frame, 7);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod error;
pub mod sync;
pub mod timer;
pub mod worker_pool;

pub use error::{CoreError, CoreResult};
pub use sync::{
    promise, CancellationToken, FrameReadGuard, FrameRing, FrameWriteGuard, Promise,
    SharedFuture, DEFAULT_WAIT_POLL,
};
pub use timer::{FrameTimer, FrameTimingStats};
pub use worker_pool::{PoolExitSignal, WorkerPool};
