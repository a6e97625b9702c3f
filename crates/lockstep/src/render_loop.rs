//! # Render Loop
//!
//! Consumer side of the frame handshake.
//!
//! ```text
//!   initialize ─► render_ready = true
//!                    │
//!                    ▼
//!        ┌──► begin_read (wait until produced > consumed)
//!        │        │
//!        │   render_frame(&FrameSceneView)
//!        │        │
//!        └─── drop guard (consumed += 1, wake update)
//! ```
//!
//! The renderer itself is a collaborator: [`FrameRenderer`]. Command
//! recording, GPU submission and presentation all live behind it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::EngineShared;
use crate::error::EngineResult;
use crate::frame::FrameSceneView;

/// Renderer collaborator driven by the render thread.
pub trait FrameRenderer: Send {
    /// Called once on the render thread before the first frame. The update
    /// loop does not start ticking until this returns.
    ///
    /// # Errors
    ///
    /// Any error stops the engine.
    fn initialize(&mut self) -> EngineResult<()>;

    /// Consumes one frame snapshot.
    ///
    /// # Errors
    ///
    /// Any error stops the engine.
    fn render_frame(&mut self, view: &FrameSceneView) -> EngineResult<()>;

    /// Called once when the render thread exits.
    fn shutdown(&mut self);
}

/// Counters published by [`HeadlessRenderer`].
#[derive(Debug, Default)]
pub struct RenderCounters {
    frames: AtomicU64,
    draws: AtomicU64,
    last_frame_number: AtomicU64,
    out_of_order: AtomicU64,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl RenderCounters {
    /// Frames rendered.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Draw commands seen across all frames.
    #[must_use]
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Acquire)
    }

    /// Frame number of the latest snapshot.
    #[must_use]
    pub fn last_frame_number(&self) -> u64 {
        self.last_frame_number.load(Ordering::Acquire)
    }

    /// Snapshots whose frame number did not follow the previous one.
    #[must_use]
    pub fn out_of_order(&self) -> u64 {
        self.out_of_order.load(Ordering::Acquire)
    }

    /// Whether `initialize` ran.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether `shutdown` ran.
    #[must_use]
    pub fn shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

/// Renderer that only counts what it is handed.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    counters: Arc<RenderCounters>,
}

impl HeadlessRenderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the counters, readable after the renderer moves to
    /// the render thread.
    #[must_use]
    pub fn counters(&self) -> Arc<RenderCounters> {
        Arc::clone(&self.counters)
    }
}

impl FrameRenderer for HeadlessRenderer {
    fn initialize(&mut self) -> EngineResult<()> {
        self.counters.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn render_frame(&mut self, view: &FrameSceneView) -> EngineResult<()> {
        let counters = &self.counters;
        let previous = counters.last_frame_number.swap(view.frame_number, Ordering::AcqRel);
        if counters.frames() > 0 && view.frame_number != previous + 1 {
            counters.out_of_order.fetch_add(1, Ordering::AcqRel);
        }
        counters.draws.fetch_add(view.draw_count() as u64, Ordering::AcqRel);
        let frames = counters.frames.fetch_add(1, Ordering::AcqRel) + 1;

        if frames % 120 == 0 {
            tracing::debug!(
                frames,
                frame_number = view.frame_number,
                draws = view.draw_count(),
                lights = view.lights.len(),
                "headless frame"
            );
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.counters.shut_down.store(true, Ordering::Release);
    }
}

/// Body of the render thread.
pub(crate) fn run_render_loop(shared: &EngineShared, renderer: &mut dyn FrameRenderer) {
    tracing::info!("render thread started");

    if let Err(err) = renderer.initialize() {
        tracing::error!(error = %err, "renderer initialization failed");
        shared.fail(err);
        return;
    }
    shared.render_ready.store(true, Ordering::Release);

    loop {
        let frame = match shared.ring.begin_read(&shared.token) {
            Ok(frame) => frame,
            Err(_) => break,
        };
        tracing::trace!(frame = frame.frame_number(), slot = frame.slot_index(), "render begin");
        let result = renderer.render_frame(&frame);
        drop(frame);

        if let Err(err) = result {
            tracing::error!(error = %err, "render frame failed");
            shared.fail(err);
            break;
        }

        let rendered = shared.render_loops.fetch_add(1, Ordering::AcqRel) + 1;
        if shared.max_render_frames.is_some_and(|max| rendered >= max) {
            tracing::info!(rendered, "render frame limit reached");
            shared.request_exit();
            break;
        }
    }

    renderer.shutdown();
    tracing::info!(
        rendered = shared.render_loops.load(Ordering::Acquire),
        "render thread exiting"
    );
}
