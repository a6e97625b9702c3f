//! # Engine Error Types

use std::io;

use lockstep_core::CoreError;
use thiserror::Error;

/// Errors that can occur starting, running or stopping the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A threading primitive failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A configuration or level file is not valid TOML for its schema.
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A configuration or level file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The renderer collaborator failed.
    #[error("renderer failure: {0}")]
    Render(String),

    /// An engine thread panicked.
    #[error("thread '{name}' panicked")]
    ThreadPanicked {
        /// Name of the thread.
        name: String,
    },
}

impl EngineError {
    /// Returns true if this error is the shutdown signal rather than a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Core(err) if err.is_cancelled())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
