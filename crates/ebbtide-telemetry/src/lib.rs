//! Telemetry primitives shared across the Ebbtide workspace.
//!
//! This crate centralises logging setup so every binary adopts the same
//! structured output and filtering behaviour.

/// Logging initialisation and configuration.
pub mod init;

pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
