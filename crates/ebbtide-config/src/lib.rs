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

//! User settings persisted as a JSON file.
//!
//! Settings failures are never fatal to startup: a missing or unreadable
//! file loads defaults, and unknown or missing keys fall back per field.
//! Saves are atomic via a staging file next to the target.
//!
//! Layout: `settings.rs` (the settings model and file store), `error.rs`.

/// Error types for settings operations.
pub mod error;
/// Settings model and file store.
pub mod settings;

pub use error::ConfigError;
pub use settings::{default_config_dir, default_resume_dir, Settings, SettingsStore};
