//! # Lockstep
//!
//! Update/render engine core: two long-lived threads exchanging
//! [`FrameSceneView`] snapshots through an N-slot ring, an app-state machine
//! that loads a level before simulating it, and a background load thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │                                                              │
//! │  update thread ── Initializing ─► Loading ─► Simulating      │
//! │       │               │ (update pool: load_level)            │
//! │       │               └──► AssetLoader ─► model/texture pools│
//! │       ▼                                                      │
//! │  FrameRing<FrameSceneView>  (N = frame_buffers)              │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  render thread ── FrameRenderer::render_frame                │
//! │                                                              │
//! │  load thread ── background LoadTask queue                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lockstep::{Engine, EngineConfig, HeadlessRenderer, LevelScene};
//! use lockstep_assets::HeadlessResourceFactory;
//!
//! let config = EngineConfig {
//!     max_render_frames: Some(60),
//!     ..EngineConfig::default()
//! };
//! let mut engine = Engine::start(
//!     &config,
//!     Box::new(LevelScene::empty()),
//!     Box::new(HeadlessRenderer::new()),
//!     Arc::new(HeadlessResourceFactory::new()),
//! )?;
//! engine.wait_for_exit();
//! let stats = engine.shutdown()?;
//! assert_eq!(stats.render_loops, 60);
//! # Ok::<(), lockstep::EngineError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod app_state;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod load_thread;
pub mod math;
pub mod render_loop;
pub mod scene;
pub mod update_loop;

pub use app_state::{AppState, SharedAppState};
pub use config::{EngineConfig, MAX_FRAME_BUFFERS};
pub use engine::{Engine, EngineStats};
pub use error::{EngineError, EngineResult};
pub use frame::{CameraData, FrameSceneView, LightData, MeshRenderCommand};
pub use load_thread::{LoadTask, LoadThread};
pub use render_loop::{FrameRenderer, HeadlessRenderer, RenderCounters};
pub use scene::{
    LevelDesc, LevelScene, LoadPlan, LoadedAssets, MaterialPlan, ModelPlan, Scene,
};
pub use update_loop::load_level;
