//! Application level error surface.
//!
//! # Design
//! - One enum wraps the typed failures of every subsystem the bootstrap
//!   touches, each variant tagged with a static `operation` label so a log
//!   line can say which step failed without parsing the message.
//! - Subsystems that report through `anyhow` cross the seam as a boxed
//!   source, keeping the chain intact for `{:#}` style printing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for application results.
pub type AppResult<T> = Result<T, AppError>;

/// Boxed error for sources that arrive through an `anyhow` boundary.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Primary error type for application bootstrap and shutdown.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be loaded or applied.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: ebbtide_config::ConfigError,
    },
    /// The resume store could not be prepared or read.
    #[error("resume store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: ebbtide_resume::ResumeStoreError,
    },
    /// Single-instance coordination failed outright.
    #[error("instance coordination failed")]
    Ipc {
        /// Operation identifier.
        operation: &'static str,
        /// Source coordination error.
        source: ebbtide_ipc::IpcError,
    },
    /// The torrent session rejected a bootstrap command.
    #[error("session operation failed")]
    Session {
        /// Operation identifier.
        operation: &'static str,
        /// Source session error.
        source: BoxedSource,
    },
    /// Logging could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: BoxedSource,
    },
    /// A bare IO step outside any subsystem failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure, when one exists.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: ebbtide_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn store(
        operation: &'static str,
        source: ebbtide_resume::ResumeStoreError,
    ) -> Self {
        Self::Store { operation, source }
    }

    pub(crate) const fn ipc(operation: &'static str, source: ebbtide_ipc::IpcError) -> Self {
        Self::Ipc { operation, source }
    }

    pub(crate) fn session(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Session {
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn telemetry(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Telemetry {
            operation,
            source: source.into(),
        }
    }
}
