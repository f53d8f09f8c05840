#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Engine-agnostic torrent domain shared across the workspace: the canonical
//! content identifier, magnet URI handling, DTOs, engine events, and the
//! trait implemented by session adapters.
//!
//! Layout: `info_hash.rs` (identifier newtype), `magnet.rs` (URI
//! validation/parsing/generation), `model/` (DTOs and events), `error.rs`
//! (error taxonomy).

/// Error taxonomy for torrent operations.
pub mod error;
/// Canonical content identifier newtype.
pub mod info_hash;
/// Magnet URI validation, parsing, and generation.
pub mod magnet;
/// Torrent DTOs and engine events.
pub mod model;

pub use error::{TorrentError, TorrentResult};
pub use info_hash::{INFO_HASH_LEN, InfoHash};
pub use magnet::{MAX_MAGNET_LEN, MagnetInfo, is_magnet_link, magnet_for, parse_magnet};
pub use model::{
    AddTorrent, AddTorrentOptions, EngineEvent, RemoveTorrent, TorrentProgress, TorrentRates,
    TorrentSource, TorrentState, TorrentStatus,
};

use async_trait::async_trait;

/// Behaviour exposed by torrent session adapters.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Admit a torrent into the session.
    async fn add_torrent(&self, request: AddTorrent) -> anyhow::Result<()>;
    /// Remove a torrent, optionally deleting downloaded payload data.
    async fn remove_torrent(&self, info_hash: InfoHash, options: RemoveTorrent)
    -> anyhow::Result<()>;
    /// Force a verification pass over on-disk files for one torrent.
    async fn recheck(&self, info_hash: InfoHash) -> anyhow::Result<()>;
    /// Ask the session to emit resume data for one torrent.
    async fn request_resume_data(&self, info_hash: InfoHash) -> anyhow::Result<()>;
}
