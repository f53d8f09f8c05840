//! Error types for instance coordination.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for single-instance coordination.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Socket access failed.
    #[error("instance socket io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Socket path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The primary instance did not acknowledge a forwarded payload.
    #[error("primary instance did not acknowledge the request")]
    Handshake {
        /// Socket path involved in the failure.
        path: PathBuf,
    },
}

impl IpcError {
    pub(crate) const fn io(operation: &'static str, path: PathBuf, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }

    pub(crate) const fn handshake(path: PathBuf) -> Self {
        Self::Handshake { path }
    }
}

/// Convenience alias for coordination results.
pub type IpcResult<T> = Result<T, IpcError>;
