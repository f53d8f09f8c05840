//! Session abstraction the worker drives.
//!
//! The trait mirrors the operations a libtorrent-style session exposes:
//! torrents are added and removed by identifier, resume data is requested
//! asynchronously, and progress arrives as polled event batches.

#![allow(clippy::redundant_pub_crate)]

mod stub;

use anyhow::Result;
use async_trait::async_trait;
use ebbtide_core::{AddTorrent, EngineEvent, InfoHash, RemoveTorrent};

pub(crate) use stub::StubSession;

use crate::types::EngineRuntimeConfig;

/// Backend contract for a torrent session.
#[async_trait]
pub(crate) trait EngineSession: Send {
    /// Register a torrent and return its resolved identifier.
    async fn add_torrent(&mut self, request: &AddTorrent) -> Result<InfoHash>;

    /// Drop a torrent from the session.
    async fn remove_torrent(&mut self, info_hash: InfoHash, options: &RemoveTorrent) -> Result<()>;

    /// Seed a freshly added torrent with a saved resume payload.
    async fn load_fastresume(&mut self, info_hash: InfoHash, payload: &[u8]) -> Result<()>;

    /// Queue a full re-verification of downloaded pieces.
    async fn recheck(&mut self, info_hash: InfoHash) -> Result<()>;

    /// Ask the session to emit resume data for one torrent.
    async fn request_resume_data(&mut self, info_hash: InfoHash) -> Result<()>;

    /// Identifiers of every torrent the session currently tracks.
    async fn active_torrents(&mut self) -> Result<Vec<InfoHash>>;

    /// Drain buffered session events.
    async fn poll_events(&mut self) -> Result<Vec<EngineEvent>>;

    /// Apply a runtime profile.
    async fn apply_config(&mut self, config: &EngineRuntimeConfig) -> Result<()>;
}

/// Construct the default session backend.
pub(crate) fn create_session() -> Box<dyn EngineSession> {
    Box::new(StubSession::default())
}
