//! Commands accepted by the session worker.

use std::time::Duration;

use ebbtide_core::{AddTorrent, InfoHash, RemoveTorrent};
use tokio::sync::oneshot;

use crate::types::EngineRuntimeConfig;

/// Instruction sent from the engine facade to the worker task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Add a torrent from a metainfo blob or magnet link.
    Add(Box<AddTorrent>),
    /// Remove a torrent and optionally its downloaded data.
    Remove {
        /// Torrent to remove.
        info_hash: InfoHash,
        /// Removal options.
        options: RemoveTorrent,
    },
    /// Re-verify downloaded payload against piece hashes.
    Recheck {
        /// Torrent to verify.
        info_hash: InfoHash,
    },
    /// Ask the session to produce resume data for one torrent.
    RequestResumeData {
        /// Torrent to snapshot.
        info_hash: InfoHash,
    },
    /// Apply a new runtime profile to the session.
    ApplyConfig(Box<EngineRuntimeConfig>),
    /// Snapshot resume data for every active torrent and wait for the
    /// session to deliver it, up to the grace period.
    PersistAll {
        /// How long to wait for outstanding resume payloads.
        grace: Duration,
        /// Channel the final report is delivered on.
        respond_to: oneshot::Sender<PersistReport>,
    },
}

/// Outcome of a whole-session resume snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Torrents whose resume artifacts reached the store.
    pub persisted: Vec<InfoHash>,
    /// Torrents that produced no resume payload before the deadline, or
    /// whose artifacts could not be written.
    pub missed: Vec<InfoHash>,
}

impl PersistReport {
    /// Whether every requested torrent was persisted.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.missed.is_empty()
    }
}
