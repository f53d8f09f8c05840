//! Artifact kinds, integrity states, and per-torrent reports.

use serde::{Deserialize, Serialize};

use ebbtide_core::InfoHash;

/// Smallest fastresume payload the engine can make use of. Anything shorter
/// is a truncated leftover from an interrupted write.
pub const MIN_FASTRESUME_LEN: u64 = 10;

/// Smallest plausible bencoded metainfo file. Real metadata carries piece
/// hashes and never comes close to this bound.
pub const MIN_METADATA_LEN: u64 = 100;

/// The artifact kinds a torrent may own in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Engine resume payload, `.fastresume`.
    FastResume,
    /// Bencoded metainfo, `.torrent`.
    Metadata,
    /// Magnet URI fallback, `.magnet`.
    Magnet,
}

impl ArtifactKind {
    /// Every kind, in the order reports and deletions walk them.
    pub const ALL: [Self; 3] = [Self::FastResume, Self::Metadata, Self::Magnet];

    /// File extension for this kind, without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::FastResume => "fastresume",
            Self::Metadata => "torrent",
            Self::Magnet => "magnet",
        }
    }

    /// Human-readable label for reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FastResume => "resume data",
            Self::Metadata => "metadata",
            Self::Magnet => "magnet link",
        }
    }

    /// Map a file extension back to its kind.
    #[must_use]
    pub fn from_extension(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension() == value)
    }

    pub(crate) const fn min_usable_len(self) -> u64 {
        match self {
            Self::FastResume => MIN_FASTRESUME_LEN,
            Self::Metadata => MIN_METADATA_LEN,
            Self::Magnet => 1,
        }
    }
}

/// Integrity verdict for one artifact.
///
/// Classification never fails on content: a file below its kind's size
/// threshold is reported as corrupt rather than raising an error, so one
/// bad artifact can never halt a startup scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArtifactState {
    /// Present and at least the minimum usable size.
    Usable {
        /// Observed file length in bytes.
        len: u64,
    },
    /// Present but below the minimum usable size.
    Corrupt {
        /// Observed file length in bytes.
        len: u64,
    },
    /// No file on disk.
    Absent,
}

impl ArtifactState {
    /// Whether the artifact can be fed to the engine.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Usable { .. })
    }

    /// Whether the artifact is present but unusable.
    #[must_use]
    pub const fn is_corrupt(self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    /// Whether a file exists at all, usable or not.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// Integrity verdicts for every artifact a torrent may own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArtifactReport {
    /// Torrent identifier the report describes.
    pub info_hash: InfoHash,
    /// Verdict for the `.fastresume` artifact.
    pub fastresume: ArtifactState,
    /// Verdict for the `.torrent` artifact.
    pub metadata: ArtifactState,
    /// Verdict for the `.magnet` artifact.
    pub magnet: ArtifactState,
}

impl ArtifactReport {
    /// Verdict for one kind.
    #[must_use]
    pub const fn state(&self, kind: ArtifactKind) -> ArtifactState {
        match kind {
            ArtifactKind::FastResume => self.fastresume,
            ArtifactKind::Metadata => self.metadata,
            ArtifactKind::Magnet => self.magnet,
        }
    }

    /// Whether one kind is usable.
    #[must_use]
    pub const fn usable(&self, kind: ArtifactKind) -> bool {
        self.state(kind).is_usable()
    }

    /// Kinds that are present but unusable.
    #[must_use]
    pub fn corrupt_kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.state(*kind).is_corrupt())
            .collect()
    }

    /// Whether any artifact is present but unusable.
    #[must_use]
    pub const fn has_corrupt(&self) -> bool {
        self.fastresume.is_corrupt() || self.metadata.is_corrupt() || self.magnet.is_corrupt()
    }

    /// Whether anything is on disk for this torrent at all.
    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.fastresume.is_present() || self.metadata.is_present() || self.magnet.is_present()
    }
}
