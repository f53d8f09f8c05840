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

//! Ebbtide application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (startup, instance coordination, shutdown),
//! `reconcile.rs` (resume store reattachment), `orchestrator.rs`
//! (torrent commands and status tracking), `engine_config.rs`
//! (settings-to-session mapping), `error.rs` (application errors).

/// Application bootstrap, instance coordination, and shutdown handling.
pub mod bootstrap;
/// Mapping from persisted settings to the session runtime profile.
pub mod engine_config;
/// Application level error surface.
pub mod error;
/// Torrent command orchestration and the live status catalog.
pub mod orchestrator;
/// Startup reconciliation of stored resume artifacts.
pub mod reconcile;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
