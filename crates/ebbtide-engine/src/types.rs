//! Runtime configuration types consumed by the session worker.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Explicit on/off switch for session services.
///
/// A bare `bool` in a struct literal reads ambiguously once several
/// switches sit next to each other; the wrapper keeps call sites legible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle(pub bool);

impl Toggle {
    /// Whether the switch is on.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.0
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

/// Peer connection encryption stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionPolicy {
    /// Refuse plaintext peers entirely.
    Require,
    /// Prefer encrypted peers but accept plaintext.
    Prefer,
    /// Never negotiate encryption.
    Disable,
}

impl EncryptionPolicy {
    /// Stable numeric encoding used when handing the policy to a session
    /// backend.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Require => 0,
            Self::Prefer => 1,
            Self::Disable => 2,
        }
    }
}

/// Full runtime profile applied to the session at startup and whenever
/// settings change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRuntimeConfig {
    /// Directory newly added torrents download into.
    pub download_root: PathBuf,
    /// Directory holding resume artifacts.
    pub resume_dir: PathBuf,
    /// Listen port for incoming peers; `None` lets the session pick.
    pub listen_port: Option<u16>,
    /// Distributed hash table participation.
    pub enable_dht: Toggle,
    /// Local service discovery.
    pub enable_lsd: Toggle,
    /// UPnP port mapping.
    pub enable_upnp: Toggle,
    /// NAT-PMP port mapping.
    pub enable_natpmp: Toggle,
    /// Download ceiling in bytes per second; `None` means unlimited.
    pub download_rate_limit: Option<i64>,
    /// Upload ceiling in bytes per second; `None` means unlimited.
    pub upload_rate_limit: Option<i64>,
    /// Encryption stance for peer connections.
    pub encryption: EncryptionPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encryption_policy_encoding_is_stable() {
        assert_eq!(EncryptionPolicy::Require.as_u8(), 0);
        assert_eq!(EncryptionPolicy::Prefer.as_u8(), 1);
        assert_eq!(EncryptionPolicy::Disable.as_u8(), 2);
    }

    #[test]
    fn toggle_converts_from_bool() {
        assert!(Toggle::from(true).is_enabled());
        assert!(!Toggle::from(false).is_enabled());
    }
}
