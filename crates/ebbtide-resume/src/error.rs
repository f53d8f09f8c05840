//! Error types for resume store operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for resume store operations.
#[derive(Debug, Error)]
pub enum ResumeStoreError {
    /// Filesystem access failed.
    #[error("resume store io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// Encoding the session marker failed.
    #[error("session marker encoding failed")]
    Serialize {
        /// Operation identifier.
        operation: &'static str,
        /// Source serialization error.
        source: serde_json::Error,
    },
}

impl ResumeStoreError {
    pub(crate) const fn io(operation: &'static str, path: PathBuf, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }

    pub(crate) const fn serialize(operation: &'static str, source: serde_json::Error) -> Self {
        Self::Serialize { operation, source }
    }
}
