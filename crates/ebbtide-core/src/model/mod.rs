//! Torrent DTOs and engine events shared across the workspace.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::info_hash::InfoHash;

/// Source describing how a torrent should be added to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TorrentSource {
    /// Represents a magnet URI that should be resolved over the network.
    Magnet {
        /// Magnet URI to resolve and add.
        uri: String,
    },
    /// Represents raw `.torrent` metainfo bytes.
    Metainfo {
        /// Bencoded metainfo payload.
        bytes: Vec<u8>,
    },
}

impl TorrentSource {
    /// Convenience constructor for magnet-based sources.
    #[must_use]
    pub fn magnet(uri: impl Into<String>) -> Self {
        Self::Magnet { uri: uri.into() }
    }

    /// Convenience constructor for metainfo-based sources.
    #[must_use]
    pub fn metainfo(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Metainfo {
            bytes: bytes.into(),
        }
    }
}

/// Optional knobs applied when admitting a torrent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTorrentOptions {
    /// Name to show before metadata arrives.
    pub name_hint: Option<String>,
    /// Directory to download into, overriding the session default.
    pub download_dir: Option<PathBuf>,
    /// Extra tracker URLs to announce to.
    pub trackers: Vec<String>,
}

/// Request payload for admitting a torrent into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTorrent {
    /// Identifier when known up front; metainfo sources may omit it and let
    /// the session derive one from the payload.
    pub info_hash: Option<InfoHash>,
    /// Where the torrent comes from.
    pub source: TorrentSource,
    /// Optional admission knobs.
    #[serde(default)]
    pub options: AddTorrentOptions,
    /// Resume payload to attach when re-admitting a torrent from a
    /// previous run.
    #[serde(default)]
    pub fastresume: Option<Vec<u8>>,
}

/// Request payload for removing a torrent from the engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RemoveTorrent {
    /// Also delete downloaded payload data from disk.
    pub with_data: bool,
    /// Leave resume artifacts on disk, used when a reattach attempt is
    /// abandoned rather than the torrent removed outright.
    #[serde(default)]
    pub keep_artifacts: bool,
}

/// Lifecycle states reported for a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorrentState {
    /// Admitted but not yet started.
    Queued,
    /// Verifying on-disk files against piece hashes.
    Checking,
    /// Waiting for metadata to arrive from peers.
    FetchingMetadata,
    /// Transferring payload data.
    Downloading,
    /// Complete and uploading to peers.
    Seeding,
    /// All payload data present.
    Completed,
    /// Unrecoverable error reported by the session.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
    /// Removed or halted by the user.
    Stopped,
}

impl TorrentState {
    /// Short lowercase label for logs and status summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Checking => "checking",
            Self::FetchingMetadata => "fetching-metadata",
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Transfer rates for a torrent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TorrentRates {
    /// Download rate in bytes per second.
    pub download_bps: u64,
    /// Upload rate in bytes per second.
    pub upload_bps: u64,
}

/// Completion progress for a torrent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TorrentProgress {
    /// Bytes downloaded and verified so far.
    pub bytes_downloaded: u64,
    /// Total payload size in bytes; zero until metadata arrives.
    pub bytes_total: u64,
}

impl TorrentProgress {
    /// Completion percentage in the range 0.0 to 100.0.
    #[must_use]
    pub const fn percent_complete(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (to_f64(self.bytes_downloaded) / to_f64(self.bytes_total)) * 100.0
        }
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "byte counts stay well below the f64 integer range"
)]
const fn to_f64(value: u64) -> f64 {
    value as f64
}

/// Snapshot of a torrent as tracked by the status catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentStatus {
    /// Torrent identifier.
    pub info_hash: InfoHash,
    /// Display name; `None` until metadata arrives.
    pub name: Option<String>,
    /// Current lifecycle state.
    pub state: TorrentState,
    /// Completion progress.
    pub progress: TorrentProgress,
    /// Transfer rates.
    pub rates: TorrentRates,
    /// Connected peer count.
    pub peers: u32,
    /// Directory the payload downloads into.
    pub download_dir: Option<PathBuf>,
    /// When the torrent was admitted this run.
    pub added_at: DateTime<Utc>,
    /// When the torrent finished, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// When this snapshot last changed.
    pub last_updated: DateTime<Utc>,
}

/// Events emitted by session adapters as work progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A torrent was admitted into the session.
    Added {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// Name when already known.
        name: Option<String>,
    },
    /// Metadata arrived for a torrent added by magnet.
    MetadataReceived {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// Name from the metadata.
        name: Option<String>,
        /// Bencoded metainfo suitable for the resume store.
        metadata: Vec<u8>,
    },
    /// Transfer progress changed.
    Progress {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// Completion progress.
        progress: TorrentProgress,
        /// Transfer rates.
        rates: TorrentRates,
        /// Connected peer count.
        peers: u32,
    },
    /// Lifecycle state changed.
    StateChanged {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// New state.
        state: TorrentState,
    },
    /// All payload data finished downloading.
    Completed {
        /// Torrent identifier.
        info_hash: InfoHash,
    },
    /// The session produced resume data for a torrent.
    ResumeData {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// Encoded resume payload.
        payload: Vec<u8>,
        /// Bencoded metainfo when serialization succeeded.
        metadata: Option<Vec<u8>>,
        /// Magnet fallback when metainfo serialization failed.
        magnet_uri: Option<String>,
    },
    /// The session could not produce resume data for a torrent.
    ResumeDataFailed {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// Failure description from the session.
        message: String,
    },
    /// The session reported a torrent-level error.
    Error {
        /// Torrent identifier.
        info_hash: InfoHash,
        /// Failure description from the session.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_constructors_build_expected_variants() {
        match TorrentSource::magnet("magnet:?xt=urn:btih:abc") {
            TorrentSource::Magnet { uri } => assert_eq!(uri, "magnet:?xt=urn:btih:abc"),
            TorrentSource::Metainfo { .. } => panic!("expected magnet variant"),
        }
        match TorrentSource::metainfo(vec![1_u8, 2, 3]) {
            TorrentSource::Metainfo { bytes } => assert_eq!(bytes, vec![1, 2, 3]),
            TorrentSource::Magnet { .. } => panic!("expected metainfo variant"),
        }
    }

    #[test]
    fn percent_complete_handles_zero_total() {
        let progress = TorrentProgress::default();
        assert!((progress.percent_complete() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_complete_scales_to_hundred() {
        let progress = TorrentProgress {
            bytes_downloaded: 512,
            bytes_total: 1_024,
        };
        assert!((progress.percent_complete() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn state_labels_are_stable() {
        assert_eq!(TorrentState::FetchingMetadata.label(), "fetching-metadata");
        let failed = TorrentState::Failed {
            message: "tracker unreachable".to_string(),
        };
        assert_eq!(failed.label(), "failed");
    }

    #[test]
    fn add_torrent_defaults_options_when_absent() {
        let json = r#"{"info_hash":null,"source":{"type":"magnet","uri":"magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567"}}"#;
        let request: AddTorrent = serde_json::from_str(json).expect("deserialize");
        assert!(request.options.name_hint.is_none());
        assert!(request.fastresume.is_none());
    }
}
