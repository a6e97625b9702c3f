//! # Load Thread
//!
//! Long-lived thread running background load tasks one at a time, in
//! submission order.
//!
//! ```text
//!   submit() ──push──► [ VecDeque<LoadTask> ] ──notify──► load thread
//!                          Mutex + Condvar          wait until (task OR stop)
//! ```
//!
//! Shutdown sets the stop flag (or cancels the engine token), then calls
//! [`LoadThread::release`], which notifies without taking the queue lock.
//! The woken thread re-checks the stop condition itself and exits. Waits are
//! also bounded by the token's poll interval, so a missed notify only
//! delays exit by one slice.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use lockstep_core::{CancellationToken, CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};

use crate::error::{EngineError, EngineResult};

/// A background load task.
pub type LoadTask = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<LoadTask>>,
    available: Condvar,
    stopping: AtomicBool,
    processed: AtomicU64,
    token: CancellationToken,
}

impl Shared {
    fn should_exit(&self) -> bool {
        self.stopping.load(Ordering::Acquire) || self.token.is_cancelled()
    }
}

/// Handle to the load thread. Dropping it stops and joins the thread.
pub struct LoadThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl LoadThread {
    /// Spawns the thread, stopping when `token` is cancelled.
    ///
    /// # Errors
    ///
    /// [`CoreError::ThreadSpawn`] if the OS refuses the thread.
    pub fn spawn(token: CancellationToken) -> CoreResult<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            stopping: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            token,
        });

        let name = String::from("lockstep-load");
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(&thread_shared))
            .map_err(|source| CoreError::ThreadSpawn { name, source })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Queues a task. Returns false, dropping the task, once stopping.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.should_exit() {
            return false;
        }
        self.shared.queue.lock().push_back(Box::new(task));
        self.shared.available.notify_one();
        true
    }

    /// Tasks queued but not started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Tasks run to completion (or panicked) so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Acquire)
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Asks the thread to exit after its current task.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.release();
    }

    /// Wakes the thread so it re-checks its stop condition. Does not take
    /// the queue lock.
    pub fn release(&self) {
        self.shared.available.notify_all();
    }

    /// Waits for the thread to exit. Call after [`LoadThread::stop`] or
    /// after cancelling the token; idempotent.
    ///
    /// # Errors
    ///
    /// [`EngineError::ThreadPanicked`] if the thread itself panicked.
    pub fn join(&mut self) -> EngineResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.join().map_err(|_| EngineError::ThreadPanicked {
            name: "lockstep-load".into(),
        })
    }
}

impl Drop for LoadThread {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.join() {
            tracing::error!(error = %err, "load thread join failed");
        }
    }
}

impl std::fmt::Debug for LoadThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadThread")
            .field("pending", &self.pending())
            .field("processed", &self.processed())
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(shared: &Shared) {
    tracing::info!("load thread started");
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.should_exit() {
                    break None;
                }
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                let _ = shared
                    .available
                    .wait_for(&mut queue, shared.token.poll_interval());
            }
        };
        let Some(task) = task else { break };

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!("load task panicked");
        }
        shared.processed.fetch_add(1, Ordering::AcqRel);
    }

    let dropped = shared.queue.lock().len();
    tracing::info!(
        processed = shared.processed.load(Ordering::Acquire),
        dropped,
        "load thread exiting"
    );
}
