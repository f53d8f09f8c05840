//! Settings model and file store.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// User-facing settings for the client.
///
/// Rate caps are in KiB/s with zero meaning unlimited; the engine layer
/// converts to bytes per second when applying them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory downloads land in.
    pub download_path: PathBuf,
    /// Download cap in KiB/s, zero for unlimited.
    pub max_download_rate: i64,
    /// Upload cap in KiB/s, zero for unlimited.
    pub max_upload_rate: i64,
    /// Dark UI theme toggle.
    pub dark_mode: bool,
    /// Require encrypted peer connections instead of merely preferring them.
    pub encryption_enabled: bool,
    /// Participate in the distributed hash table.
    pub dht_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            max_download_rate: 1_000,
            max_upload_rate: 200,
            dark_mode: false,
            encryption_enabled: true,
            dht_enabled: true,
        }
    }
}

fn default_download_path() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || PathBuf::from("."),
        |home| PathBuf::from(home).join("Downloads").join("torrents"),
    )
}

/// Per-user configuration directory holding the settings file and the
/// resume artifact store.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || PathBuf::from("."),
        |home| PathBuf::from(home).join(".config").join("ebbtide"),
    )
}

/// Default resume artifact directory, shared by the application and the
/// maintenance tool.
#[must_use]
pub fn default_resume_dir() -> PathBuf {
    default_config_dir().join("resume")
}

/// JSON file store for [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Create a handle over the given settings file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable. A malformed file is logged, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for filesystem failures other than
    /// absence.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::io("settings.load", self.path.clone(), source));
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(settings) => Ok(settings),
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "settings file unreadable, using defaults"
                );
                Ok(Settings::default())
            }
        }
    }

    /// Save settings atomically, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] when encoding fails and
    /// [`ConfigError::Io`] when the write fails.
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::io("settings.save", parent.to_path_buf(), source))?;
        }
        let payload = serde_json::to_vec_pretty(settings)
            .map_err(|source| ConfigError::serialize("settings.save", source))?;
        let staged = self.staging_path();
        fs::write(&staged, &payload)
            .map_err(|source| ConfigError::io("settings.save", staged.clone(), source))?;
        if let Err(source) = fs::rename(&staged, &self.path) {
            let _ = fs::remove_file(&staged);
            return Err(ConfigError::io("settings.save", self.path.clone(), source));
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let name = self.path.file_name().and_then(OsStr::to_str).map_or_else(
            || ".settings.tmp".to_string(),
            |name| format!(".{name}.tmp"),
        );
        self.path.with_file_name(name)
    }
}
