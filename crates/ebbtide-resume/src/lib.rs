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

//! Durable per-torrent resume state kept in a flat directory.
//!
//! Each torrent owns up to three artifacts named by its identifier:
//! `{hash}.fastresume` (engine resume payload), `{hash}.torrent` (bencoded
//! metadata), and `{hash}.magnet` (magnet URI fallback). The store writes
//! atomically via a staging file in the same directory, lists torrents as
//! the union of stems across all three kinds, and classifies artifacts by
//! size thresholds so corrupt leftovers from interrupted writes are
//! detected before they reach the engine.
//!
//! Layout: `artifact.rs` (kinds, integrity states, per-torrent report),
//! `store.rs` (directory store and session marker), `error.rs`.

/// Artifact kinds, integrity states, and per-torrent reports.
pub mod artifact;
/// Error types for store operations.
pub mod error;
/// The directory-backed store and the session marker.
pub mod store;

pub use artifact::{
    ArtifactKind, ArtifactReport, ArtifactState, MIN_FASTRESUME_LEN, MIN_METADATA_LEN,
};
pub use error::ResumeStoreError;
pub use store::{ResumeStore, SessionMarker};
