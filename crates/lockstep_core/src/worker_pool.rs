//! # Worker Pool
//!
//! A fixed set of named threads executing dispatched units of work.
//!
//! ## Architecture
//!
//! ```text
//!   dispatch(f) ──► active += 1 ──► [unbounded queue] ──► worker 0..N
//!                                                            │
//!                                    active -= 1 ◄── unit dropped
//!                                   (ran, panicked or discarded)
//! ```
//!
//! The active count is the completion signal for the update thread: a level
//! load is done when its pool reports zero active tasks. Every unit carries a
//! guard that releases its share of the count when the unit is dropped, so the
//! count can never be left stranded by a failing or discarded unit.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Releases one unit's share of the active count when dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct WorkUnit {
    job: Job,
    _active: ActiveGuard,
}

// Pulls units off the shared queue until its finish channel is signalled
struct PoolWorker {
    finish_tx: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl PoolWorker {
    fn spawn(
        pool_name: &str,
        thread_index: usize,
        request_rx: Receiver<WorkUnit>,
    ) -> CoreResult<Self> {
        let (finish_tx, finish_rx) = crossbeam_channel::bounded(1);
        let thread_name = format!("{pool_name}-{thread_index}");
        let pool = pool_name.to_string();

        let join_handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!(pool = %pool, thread_index, "worker started");
                loop {
                    let keep_running = crossbeam_channel::select! {
                        recv(request_rx) -> msg => match msg {
                            Ok(unit) => {
                                run_unit(&pool, thread_index, unit);
                                true
                            }
                            Err(_) => false,
                        },
                        recv(finish_rx) -> _msg => false,
                    };
                    if !keep_running {
                        break;
                    }
                }
                tracing::debug!(pool = %pool, thread_index, "worker exiting");
            })
            .map_err(|source| CoreError::ThreadSpawn {
                name: thread_name,
                source,
            })?;

        Ok(Self {
            finish_tx,
            join_handle,
        })
    }
}

fn run_unit(pool: &str, thread_index: usize, unit: WorkUnit) {
    let WorkUnit { job, _active } = unit;
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!(pool, thread_index, "unit of work panicked");
    }
    // `_active` drops here, after the unit has fully finished.
}

/// Cloneable view of a pool's exit flag, for units that need to observe
/// shutdown between steps of their work.
#[derive(Clone, Debug)]
pub struct PoolExitSignal(Arc<AtomicBool>);

impl PoolExitSignal {
    /// Whether the owning pool has begun shutting down.
    #[inline]
    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Fixed-size thread pool with a live in-flight count.
pub struct WorkerPool {
    name: String,
    thread_count: usize,
    workers: Mutex<Vec<PoolWorker>>,
    request_tx: Sender<WorkUnit>,
    // Kept so queued units can be drained (and their counts released) on shutdown.
    request_rx: Receiver<WorkUnit>,
    active: Arc<AtomicUsize>,
    exiting: Arc<AtomicBool>,
    // Serializes the exiting check in `dispatch` against `shutdown`.
    dispatch_gate: RwLock<()>,
}

impl WorkerPool {
    /// Spawns `threads` workers named `"{name}-{index}"`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a zero thread count and
    /// [`CoreError::ThreadSpawn`] if the OS refuses a thread. Workers spawned
    /// before a failure are shut down again.
    pub fn new(name: impl Into<String>, threads: usize) -> CoreResult<Self> {
        let name = name.into();
        if threads == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "worker pool '{name}' needs at least one thread"
            )));
        }

        let (request_tx, request_rx) = crossbeam_channel::unbounded::<WorkUnit>();
        let pool = Self {
            name,
            thread_count: threads,
            workers: Mutex::new(Vec::with_capacity(threads)),
            request_tx,
            request_rx,
            active: Arc::new(AtomicUsize::new(0)),
            exiting: Arc::new(AtomicBool::new(false)),
            dispatch_gate: RwLock::new(()),
        };

        for thread_index in 0..threads {
            let worker = PoolWorker::spawn(&pool.name, thread_index, pool.request_rx.clone())?;
            pool.workers.lock().push(worker);
        }

        tracing::debug!(pool = %pool.name, threads, "worker pool started");
        Ok(pool)
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Enqueues a unit of work and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PoolExiting`] once shutdown has begun.
    pub fn dispatch<F>(&self, f: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let _gate = self.dispatch_gate.read();
        if self.is_exiting() {
            return Err(CoreError::PoolExiting {
                pool: self.name.clone(),
            });
        }

        self.active.fetch_add(1, Ordering::AcqRel);
        let unit = WorkUnit {
            job: Box::new(f),
            _active: ActiveGuard(Arc::clone(&self.active)),
        };
        // The pool holds a receiver, so the channel cannot be disconnected here.
        // A failed send still drops the unit, which releases its count.
        if self.request_tx.send(unit).is_err() {
            tracing::error!(pool = %self.name, "work queue disconnected");
        }
        Ok(())
    }

    /// Units dispatched but not yet finished.
    #[inline]
    #[must_use]
    pub fn num_active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Whether shutdown has begun.
    #[inline]
    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Handle units can capture to observe [`WorkerPool::is_exiting`].
    #[must_use]
    pub fn exit_signal(&self) -> PoolExitSignal {
        PoolExitSignal(Arc::clone(&self.exiting))
    }

    /// Stops accepting work, lets running units finish, joins every worker
    /// and discards units that never started. Idempotent.
    pub fn shutdown(&self) {
        {
            let _gate = self.dispatch_gate.write();
            self.exiting.store(true, Ordering::Release);
        }

        let workers: Vec<PoolWorker> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        for worker in &workers {
            // A worker that already exited has dropped its receiver; nothing to signal.
            let _ = worker.finish_tx.send(());
        }
        let current = std::thread::current().id();
        for worker in workers {
            // The last owner of the pool can be a unit running on one of its
            // own workers; that worker exits on its own once the unit returns.
            if worker.join_handle.thread().id() == current {
                continue;
            }
            if worker.join_handle.join().is_err() {
                tracing::error!(pool = %self.name, "worker thread panicked outside a unit");
            }
        }

        let discarded = self.request_rx.try_iter().count();
        if discarded > 0 {
            tracing::debug!(pool = %self.name, discarded, "dropped queued units at shutdown");
        }
        tracing::debug!(pool = %self.name, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("thread_count", &self.thread_count)
            .field("active", &self.num_active_tasks())
            .field("exiting", &self.is_exiting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_idle(pool: &WorkerPool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.num_active_tasks() > 0 {
            assert!(Instant::now() < deadline, "pool never went idle");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            WorkerPool::new("empty", 0),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_units_run_and_count_returns_to_zero() {
        let pool = WorkerPool::new("test", 3).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let ran = Arc::clone(&ran);
            pool.dispatch(move || {
                ran.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        wait_idle(&pool);
        assert_eq!(ran.load(Ordering::Relaxed), 100);
        assert_eq!(pool.num_active_tasks(), 0);
    }

    #[test]
    fn test_count_visible_while_unit_runs() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        pool.dispatch(move || {
            let _ = release_rx.recv();
        })
        .unwrap();
        assert_eq!(pool.num_active_tasks(), 1);

        release_tx.send(()).unwrap();
        wait_idle(&pool);
    }

    #[test]
    fn test_panicking_unit_still_decrements() {
        let pool = WorkerPool::new("test", 1).unwrap();
        pool.dispatch(|| panic!("unit failure")).unwrap();
        wait_idle(&pool);

        // Worker survives the panic.
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.dispatch(move || tx.send(5).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 5);
    }

    #[test]
    fn test_shutdown_discards_queued_units() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let ran = Arc::new(AtomicUsize::new(0));

        pool.dispatch(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
        .unwrap();
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            pool.dispatch(move || {
                ran.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        started_rx.recv().unwrap();
        assert_eq!(pool.num_active_tasks(), 11);

        release_tx.send(()).unwrap();
        pool.shutdown();

        assert!(pool.is_exiting());
        assert_eq!(pool.num_active_tasks(), 0);
        assert!(ran.load(Ordering::Relaxed) <= 10);
        assert!(matches!(
            pool.dispatch(|| {}),
            Err(CoreError::PoolExiting { .. })
        ));

        // Second call is a no-op.
        pool.shutdown();
    }

    #[test]
    fn test_exit_signal_tracks_pool() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let signal = pool.exit_signal();
        assert!(!signal.is_exiting());
        pool.shutdown();
        assert!(signal.is_exiting());
    }
}
