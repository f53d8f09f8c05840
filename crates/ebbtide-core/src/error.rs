//! Error types for torrent operations.

use std::error::Error;

use thiserror::Error;

use crate::info_hash::InfoHash;

/// Convenience alias for torrent operation results.
pub type TorrentResult<T> = Result<T, TorrentError>;

/// Primary error type for torrent operations.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// Input was not a valid content identifier.
    #[error("invalid info hash {value:?}: {reason}")]
    InvalidInfoHash {
        /// Rejected input, as supplied.
        value: String,
        /// Why the input was rejected.
        reason: &'static str,
    },
    /// Input was not a valid magnet URI.
    #[error("invalid magnet link: {reason}")]
    InvalidMagnet {
        /// Why the input was rejected.
        reason: String,
    },
    /// Operation failed in the underlying engine or its stores.
    #[error("torrent operation failed")]
    OperationFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Torrent identifier when available.
        info_hash: Option<InfoHash>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Torrent is not present in the session.
    #[error("torrent not found")]
    NotFound {
        /// Torrent identifier.
        info_hash: InfoHash,
    },
    /// Torrent is already present in the session.
    #[error("torrent is already active")]
    AlreadyActive {
        /// Torrent identifier.
        info_hash: InfoHash,
    },
}

impl TorrentError {
    /// Wrap an underlying failure with the operation that produced it.
    #[must_use]
    pub fn operation_failed(
        operation: &'static str,
        info_hash: Option<InfoHash>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::OperationFailed {
            operation,
            info_hash,
            source: source.into(),
        }
    }

    pub(crate) fn invalid_info_hash(value: &str, reason: &'static str) -> Self {
        Self::InvalidInfoHash {
            value: value.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_magnet(reason: impl Into<String>) -> Self {
        Self::InvalidMagnet {
            reason: reason.into(),
        }
    }
}
