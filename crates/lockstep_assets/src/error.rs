//! # Asset Error Types
//!
//! Load failures are recovered inside the worker: they never reach callers of
//! `start_loading_*` as `Err`. They travel inside a [`crate::LoadOutcome`]
//! next to the fallback identifier that was substituted.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a [`crate::ResourceFactory`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The device has no room for the requested allocation.
    #[error("out of device memory (requested {requested_bytes} bytes)")]
    OutOfMemory {
        /// Size of the refused allocation.
        requested_bytes: u64,
    },

    /// The resource description was rejected.
    #[error("invalid resource parameters: {0}")]
    InvalidParameters(String),
}

/// Errors that can occur while loading a single asset.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The source file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Source path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The source file was read but its contents are unusable.
    #[error("failed to decode '{path}': {reason}")]
    Decode {
        /// Source path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// The renderer refused to create the resource.
    #[error("failed to create resources for '{path}': {source}")]
    ResourceCreation {
        /// Source path.
        path: PathBuf,
        /// Renderer error.
        #[source]
        source: ResourceError,
    },

    /// The load was discarded before it produced a value (shutdown).
    #[error("load of '{path}' was abandoned")]
    Abandoned {
        /// Source path.
        path: PathBuf,
    },
}

impl AssetError {
    /// Source path the failure refers to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            AssetError::Io { path, .. }
            | AssetError::Decode { path, .. }
            | AssetError::ResourceCreation { path, .. }
            | AssetError::Abandoned { path } => path,
        }
    }
}

/// Result type for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;
