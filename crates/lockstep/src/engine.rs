//! # Engine Lifecycle
//!
//! Owns the three long-lived threads and the worker pools, and runs the
//! shutdown sequence.
//!
//! ## Threads
//!
//! ```text
//!   lockstep-update ──FrameRing<FrameSceneView>──► lockstep-render
//!        │
//!        └─ update pool ─► AssetLoader ─► model pool / texture pool
//!
//!   lockstep-load (background load tasks)
//! ```
//!
//! ## Shutdown Order
//!
//! 1. Cancel the token (global stop flag) and wake every ring waiter
//! 2. Join render and update; each exits at its next gate
//! 3. Release the load thread's wait without holding its lock, then join it
//! 4. Shut the worker pools down
//! 5. Reset the frame ring

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lockstep_assets::{AssetLoader, LoaderStats, ResourceFactory};
use lockstep_core::{CancellationToken, CoreError, FrameRing, FrameTimer, WorkerPool};
use parking_lot::{Condvar, Mutex};

use crate::app_state::{AppState, SharedAppState};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::frame::FrameSceneView;
use crate::load_thread::LoadThread;
use crate::render_loop::{run_render_loop, FrameRenderer};
use crate::scene::Scene;
use crate::update_loop::UpdateLoop;

/// State shared by the update and render threads.
pub(crate) struct EngineShared {
    pub(crate) ring: FrameRing<FrameSceneView>,
    pub(crate) token: CancellationToken,
    pub(crate) app_state: SharedAppState,
    /// Set by the render thread once its renderer is initialized.
    pub(crate) render_ready: AtomicBool,
    pub(crate) update_loops: AtomicU64,
    pub(crate) render_loops: AtomicU64,
    pub(crate) max_render_frames: Option<u64>,
    exit_requested: Mutex<bool>,
    exit_signal: Condvar,
    failure: Mutex<Option<EngineError>>,
}

impl EngineShared {
    /// Wakes everyone in [`Engine::wait_for_exit`]. Does not stop threads.
    pub(crate) fn request_exit(&self) {
        let mut requested = self.exit_requested.lock();
        if !*requested {
            *requested = true;
            tracing::info!("engine exit requested");
        }
        self.exit_signal.notify_all();
    }

    /// Records a fault, stops the engine and requests exit. The first fault
    /// is kept.
    pub(crate) fn fail(&self, err: EngineError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.token.cancel();
        self.ring.release_waiters();
        self.request_exit();
    }

    fn wait_for_exit(&self, deadline: Option<Instant>) -> bool {
        let mut requested = self.exit_requested.lock();
        loop {
            if *requested || self.token.is_cancelled() {
                return true;
            }
            let mut slice = self.token.poll_interval();
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                slice = slice.min(deadline - now);
            }
            let _ = self.exit_signal.wait_for(&mut requested, slice);
        }
    }
}

/// Requests exit when dropped, so waiters wake even if a thread panics.
struct ExitOnDrop(Arc<EngineShared>);

impl Drop for ExitOnDrop {
    fn drop(&mut self) {
        self.0.request_exit();
    }
}

/// Snapshot of engine activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStats {
    /// Completed update ticks.
    pub update_loops: u64,
    /// Frames consumed by the render thread.
    pub render_loops: u64,
    /// Current app state.
    pub app_state: AppState,
    /// Frames published but not yet consumed.
    pub frames_in_flight: u64,
    /// Asset loader counters.
    pub loader: LoaderStats,
    /// Tasks finished by the load thread.
    pub load_tasks_processed: u64,
}

/// A running engine.
pub struct Engine {
    shared: Arc<EngineShared>,
    loader: AssetLoader,
    update_pool: Arc<WorkerPool>,
    model_pool: Arc<WorkerPool>,
    texture_pool: Arc<WorkerPool>,
    load_thread: LoadThread,
    update_thread: Option<JoinHandle<()>>,
    render_thread: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl Engine {
    /// Validates `config`, creates the pools, and starts the load, render
    /// and update threads.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for an invalid configuration, or a
    /// [`CoreError`] if a pool or thread cannot be created.
    pub fn start(
        config: &EngineConfig,
        scene: Box<dyn Scene>,
        mut renderer: Box<dyn FrameRenderer>,
        factory: Arc<dyn ResourceFactory>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let token = CancellationToken::with_poll_interval(config.wait_poll());

        let update_pool = Arc::new(WorkerPool::new("update", config.update_workers)?);
        let model_pool = Arc::new(WorkerPool::new("model-load", config.model_workers)?);
        let texture_pool = Arc::new(WorkerPool::new("texture-load", config.texture_workers)?);
        let loader = AssetLoader::new(
            Arc::clone(&model_pool),
            Arc::clone(&texture_pool),
            factory,
            token.clone(),
        );

        let shared = Arc::new(EngineShared {
            ring: FrameRing::new(config.frame_buffers)?,
            token: token.clone(),
            app_state: SharedAppState::default(),
            render_ready: AtomicBool::new(false),
            update_loops: AtomicU64::new(0),
            render_loops: AtomicU64::new(0),
            max_render_frames: config.max_render_frames,
            exit_requested: Mutex::new(false),
            exit_signal: Condvar::new(),
            failure: Mutex::new(None),
        });

        let load_thread = LoadThread::spawn(token)?;

        // From here on, an early return drops `engine`, which shuts down
        // whatever was already started.
        let mut engine = Self {
            shared,
            loader,
            update_pool,
            model_pool,
            texture_pool,
            load_thread,
            update_thread: None,
            render_thread: None,
            shut_down: false,
        };

        let render_shared = Arc::clone(&engine.shared);
        engine.render_thread = Some(spawn_named("lockstep-render", move || {
            let _exit = ExitOnDrop(Arc::clone(&render_shared));
            run_render_loop(&render_shared, renderer.as_mut());
        })?);

        let update_loop = UpdateLoop {
            shared: Arc::clone(&engine.shared),
            loader: engine.loader.clone(),
            update_pool: Arc::clone(&engine.update_pool),
            scene,
            timer: FrameTimer::new(config.target_update_hz),
        };
        let update_shared = Arc::clone(&engine.shared);
        engine.update_thread = Some(spawn_named("lockstep-update", move || {
            let _exit = ExitOnDrop(update_shared);
            update_loop.run();
        })?);

        tracing::info!(
            frame_buffers = config.frame_buffers,
            model_workers = config.model_workers,
            texture_workers = config.texture_workers,
            target_update_hz = config.target_update_hz,
            "engine started"
        );
        Ok(engine)
    }

    /// The engine's asset loader.
    #[must_use]
    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    /// The background load thread.
    #[must_use]
    pub fn load_thread(&self) -> &LoadThread {
        &self.load_thread
    }

    /// Current app state.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        self.shared.app_state.get()
    }

    /// Whether the render thread has initialized its renderer.
    #[must_use]
    pub fn is_render_ready(&self) -> bool {
        self.shared.render_ready.load(Ordering::Acquire)
    }

    /// The global stop flag.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    /// Activity snapshot.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            update_loops: self.shared.update_loops.load(Ordering::Acquire),
            render_loops: self.shared.render_loops.load(Ordering::Acquire),
            app_state: self.shared.app_state.get(),
            frames_in_flight: self.shared.ring.in_flight(),
            loader: self.loader.stats(),
            load_tasks_processed: self.load_thread.processed(),
        }
    }

    /// Wakes [`Engine::wait_for_exit`] without stopping anything.
    pub fn request_exit(&self) {
        self.shared.request_exit();
    }

    /// Blocks until the render frame limit is reached, exit is requested, or
    /// the engine stops on a fault.
    pub fn wait_for_exit(&self) {
        self.shared.wait_for_exit(None);
    }

    /// As [`Engine::wait_for_exit`], giving up after `timeout`. Returns
    /// whether exit was signalled.
    #[must_use]
    pub fn wait_for_exit_timeout(&self, timeout: Duration) -> bool {
        self.shared.wait_for_exit(Some(Instant::now() + timeout))
    }

    /// Stops every thread and pool. Idempotent; later calls return the
    /// final stats.
    ///
    /// # Errors
    ///
    /// [`EngineError::ThreadPanicked`] if a thread panicked, or the fault
    /// that stopped the engine (e.g. a renderer error).
    pub fn shutdown(&mut self) -> EngineResult<EngineStats> {
        if self.shut_down {
            return Ok(self.stats());
        }
        self.shut_down = true;

        tracing::info!("engine shutdown: stop flag set");
        self.shared.token.cancel();
        self.shared.ring.release_waiters();
        self.shared.request_exit();

        let mut first_error: Option<EngineError> = None;
        for (name, handle) in [
            ("lockstep-render", self.render_thread.take()),
            ("lockstep-update", self.update_thread.take()),
        ] {
            let Some(handle) = handle else { continue };
            if handle.join().is_err() {
                tracing::error!(thread = name, "thread panicked");
                if first_error.is_none() {
                    first_error = Some(EngineError::ThreadPanicked { name: name.into() });
                }
            }
        }
        tracing::info!("engine shutdown: update and render joined");

        self.load_thread.release();
        if let Err(err) = self.load_thread.join() {
            first_error = first_error.or(Some(err));
        }
        tracing::info!("engine shutdown: load thread joined");

        self.update_pool.shutdown();
        self.model_pool.shutdown();
        self.texture_pool.shutdown();
        self.shared.ring.reset();

        let stats = self.stats();
        tracing::info!(
            update_loops = stats.update_loops,
            render_loops = stats.render_loops,
            app_state = %stats.app_state,
            "engine shutdown complete"
        );

        match first_error.or_else(|| self.shared.failure.lock().take()) {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(error = %err, "engine shutdown failed");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("stats", &self.stats())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

fn spawn_named<F>(name: &str, body: F) -> EngineResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| {
            EngineError::Core(CoreError::ThreadSpawn {
                name: name.to_string(),
                source,
            })
        })
}
