//! Maps persisted settings onto the session runtime profile.
//!
//! Rate caps are stored in KiB/s with zero meaning unlimited; the session
//! wants bytes per second or `None`. The encryption flag widens into the
//! session's three-valued policy here so the settings model never has to
//! name engine types.

use std::path::Path;

use ebbtide_config::Settings;
use ebbtide_engine::{EncryptionPolicy, EngineRuntimeConfig, Toggle};

/// Build the runtime profile applied to the session from user settings.
///
/// Local service discovery and port mapping have no settings switches and
/// stay on; the listen port is left to the session.
#[must_use]
pub fn runtime_config(settings: &Settings, resume_dir: &Path) -> EngineRuntimeConfig {
    EngineRuntimeConfig {
        download_root: settings.download_path.clone(),
        resume_dir: resume_dir.to_path_buf(),
        listen_port: None,
        enable_dht: Toggle::from(settings.dht_enabled),
        enable_lsd: Toggle::from(true),
        enable_upnp: Toggle::from(true),
        enable_natpmp: Toggle::from(true),
        download_rate_limit: rate_limit_bps(settings.max_download_rate),
        upload_rate_limit: rate_limit_bps(settings.max_upload_rate),
        encryption: encryption_policy(settings.encryption_enabled),
    }
}

/// Convert a KiB/s cap into bytes per second; zero or below disables it.
#[must_use]
pub const fn rate_limit_bps(kib_per_second: i64) -> Option<i64> {
    if kib_per_second > 0 {
        Some(kib_per_second.saturating_mul(1024))
    } else {
        None
    }
}

const fn encryption_policy(require: bool) -> EncryptionPolicy {
    if require {
        EncryptionPolicy::Require
    } else {
        EncryptionPolicy::Prefer
    }
}
