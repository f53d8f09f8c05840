//! Error types for settings operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for settings operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem access failed.
    #[error("settings io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// Encoding the settings payload failed.
    #[error("settings encoding failed")]
    Serialize {
        /// Operation identifier.
        operation: &'static str,
        /// Source serialization error.
        source: serde_json::Error,
    },
}

impl ConfigError {
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
