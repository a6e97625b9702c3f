//! # Lockstep Assets
//!
//! Deduplicated, deferred loading of models and textures.
//!
//! ## Flow
//!
//! ```text
//!   scene load ──► queue_model_load / queue_texture_load
//!                         │
//!                         ▼
//!                  start_loading_*  ──► InFlightRegistry (one load per key)
//!                         │                    │
//!                         │                    └──► WorkerPool: read + decode + create
//!                         ▼
//!                 owner → DeferredLoad ──► LoadOutcome { id, error }
//! ```
//!
//! Loads never fail outward: a missing or broken file resolves to the
//! renderer's fallback identifier with the error attached, so the engine can
//! always leave its loading state.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod assignments;
pub mod error;
pub mod ids;
pub mod import;
pub mod loader;
pub mod queue;
pub mod registry;
pub mod renderer;
pub mod requests;

pub use assignments::{resolve_texture_assignments, MaterialTextureAssignment};
pub use error::{AssetError, AssetResult, ResourceError};
pub use ids::{LoadTaskId, MaterialId, ModelId, OwnerId, TextureId};
pub use import::{
    asset_name, decode_texture, import_obj_model, load_texture_file, ImportContext, ImportModelFn,
};
pub use loader::{AssetLoader, LoaderStats};
pub use queue::{LoadBatch, LoadQueue};
pub use registry::{InFlightRegistry, Slot};
pub use renderer::{
    HeadlessResourceFactory, MaterialRecord, MeshData, ModelRecord, ResourceFactory,
    TextureFormat, TextureImage, Vertex,
};
pub use requests::{
    DeferredLoad, LoadOutcome, ModelLoadRequest, ModelLoadResult, ModelLoadResults,
    TextureLoadRequest, TextureLoadResult, TextureLoadResults, TextureRole,
};
