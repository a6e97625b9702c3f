//! # Core Error Types
//!
//! Errors raised by the threading primitives.

use std::io;

use thiserror::Error;

/// Errors that can occur in the core primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A blocking wait observed the cancellation token.
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// Work was dispatched to a pool that is shutting down.
    #[error("worker pool '{pool}' is exiting")]
    PoolExiting {
        /// Name of the pool.
        pool: String,
    },

    /// An OS thread could not be spawned.
    #[error("failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        /// Name the thread was given.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A primitive was constructed with unusable parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Returns true if this error is the shutdown signal rather than a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
