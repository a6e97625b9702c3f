//! # Engine Configuration
//!
//! Loaded once at startup. Every field has a default, so a partial file (or
//! none at all) is valid.
//!
//! ```toml
//! frame_buffers = 3
//! model_workers = 4
//! texture_workers = 4
//! update_workers = 1
//! target_update_hz = 60
//! max_render_frames = 300
//! wait_poll_ms = 5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Largest supported pipeline depth.
pub const MAX_FRAME_BUFFERS: usize = 8;

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// FrameSceneView slots: how many frames update may run ahead of render.
    pub frame_buffers: usize,
    /// Threads in the model-load pool.
    pub model_workers: usize,
    /// Threads in the texture-load pool.
    pub texture_workers: usize,
    /// Threads in the update worker pool (level loading).
    pub update_workers: usize,
    /// Update rate cap in Hz; 0 runs unpaced.
    pub target_update_hz: u32,
    /// Stop automatically after this many rendered frames.
    pub max_render_frames: Option<u64>,
    /// Upper bound on how long a blocked wait goes without re-checking the
    /// stop flag, in milliseconds.
    pub wait_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_buffers: 3,
            model_workers: 4,
            texture_workers: 4,
            update_workers: 1,
            target_update_hz: 0,
            max_render_frames: None,
            wait_poll_ms: 5,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`EngineError::Toml`] for malformed input, [`EngineError::Config`]
    /// for out-of-range values.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As [`EngineConfig::from_toml_str`], plus [`EngineError::Io`].
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Checks every field is in range.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] naming the first offending field.
    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=MAX_FRAME_BUFFERS).contains(&self.frame_buffers) {
            return Err(EngineError::Config(format!(
                "frame_buffers must be in 1..={MAX_FRAME_BUFFERS}, got {}",
                self.frame_buffers
            )));
        }
        for (field, value) in [
            ("model_workers", self.model_workers),
            ("texture_workers", self.texture_workers),
            ("update_workers", self.update_workers),
        ] {
            if value == 0 {
                return Err(EngineError::Config(format!("{field} must be at least 1")));
            }
        }
        if self.wait_poll_ms == 0 {
            return Err(EngineError::Config("wait_poll_ms must be at least 1".into()));
        }
        if self.max_render_frames == Some(0) {
            return Err(EngineError::Config(
                "max_render_frames must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// [`EngineConfig::wait_poll_ms`] as a duration.
    #[must_use]
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}
