//! Directory-backed resume store and the session marker.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ebbtide_core::InfoHash;

use crate::artifact::{ArtifactKind, ArtifactReport, ArtifactState};
use crate::error::ResumeStoreError;

/// File holding the state of the last clean shutdown, kept next to the
/// artifacts. Its stem can never collide with a torrent's because torrent
/// stems are forty hex characters.
const SESSION_MARKER_FILE: &str = "session.json";

/// Download path in effect when the session last shut down cleanly.
///
/// Resume payloads embed absolute file mappings, so when the configured
/// download path no longer matches the recorded one, reconciliation must
/// not trust stored fastresume data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMarker {
    /// Download directory at the time of the last clean shutdown.
    pub download_path: PathBuf,
    /// When the marker was written.
    pub saved_at: DateTime<Utc>,
}

/// Flat-directory store for per-torrent resume artifacts.
///
/// All operations are synchronous filesystem calls; async callers drive the
/// store from a worker task that already serializes access.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    root: PathBuf,
}

impl ResumeStore {
    /// Create a handle over the given directory. Nothing is touched on disk
    /// until [`ResumeStore::ensure_initialized`] or a write runs.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the backing directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] when the directory cannot be created.
    pub fn ensure_initialized(&self) -> Result<(), ResumeStoreError> {
        fs::create_dir_all(&self.root)
            .map_err(|source| ResumeStoreError::io("resume.init", self.root.clone(), source))
    }

    /// The directory backing this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of one artifact, whether or not it exists.
    #[must_use]
    pub fn artifact_path(&self, info_hash: InfoHash, kind: ArtifactKind) -> PathBuf {
        self.root.join(artifact_file_name(info_hash, kind))
    }

    /// Read one artifact's payload.
    ///
    /// Returns `Ok(None)` when the artifact does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] for failures other than absence.
    pub fn read(
        &self,
        info_hash: InfoHash,
        kind: ArtifactKind,
    ) -> Result<Option<Vec<u8>>, ResumeStoreError> {
        let path = self.artifact_path(info_hash, kind);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ResumeStoreError::io("resume.read", path, source)),
        }
    }

    /// Write one artifact atomically.
    ///
    /// The payload lands in a staging file in the same directory and is
    /// renamed over the target, so a crash mid-write can leave a stale
    /// staging file behind but never a half-written artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] when staging or renaming fails.
    pub fn write(
        &self,
        info_hash: InfoHash,
        kind: ArtifactKind,
        payload: &[u8],
    ) -> Result<(), ResumeStoreError> {
        self.write_atomic(&artifact_file_name(info_hash, kind), payload, "resume.write")
    }

    /// Delete one artifact. Returns whether a file was actually removed.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] for failures other than absence.
    pub fn delete(
        &self,
        info_hash: InfoHash,
        kind: ArtifactKind,
    ) -> Result<bool, ResumeStoreError> {
        let path = self.artifact_path(info_hash, kind);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ResumeStoreError::io("resume.delete", path, source)),
        }
    }

    /// Delete every artifact a torrent owns, tolerating absence. Artifacts
    /// belonging to other torrents are never touched. Returns the kinds
    /// that were actually removed.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] for failures other than absence.
    pub fn delete_all(&self, info_hash: InfoHash) -> Result<Vec<ArtifactKind>, ResumeStoreError> {
        let mut removed = Vec::new();
        for kind in ArtifactKind::ALL {
            if self.delete(info_hash, kind)? {
                removed.push(kind);
            }
        }
        Ok(removed)
    }

    /// Every torrent with at least one artifact on disk, sorted.
    ///
    /// The listing is the union of stems across all artifact kinds; files
    /// whose name is not `{forty hex chars}.{known extension}` are ignored,
    /// which keeps staging leftovers and the session marker out of the way.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] when the directory cannot be read.
    /// A missing directory yields an empty listing.
    pub fn list_identifiers(&self) -> Result<Vec<InfoHash>, ResumeStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ResumeStoreError::io("resume.list", self.root.clone(), source));
            }
        };

        let mut identifiers = BTreeSet::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| ResumeStoreError::io("resume.list", self.root.clone(), source))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((stem, extension)) = name.rsplit_once('.') else {
                continue;
            };
            if ArtifactKind::from_extension(extension).is_some()
                && let Ok(info_hash) = InfoHash::parse(stem)
            {
                identifiers.insert(info_hash);
            }
        }
        Ok(identifiers.into_iter().collect())
    }

    /// Integrity verdict for one artifact, by size threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] for failures other than absence.
    pub fn classify(
        &self,
        info_hash: InfoHash,
        kind: ArtifactKind,
    ) -> Result<ArtifactState, ResumeStoreError> {
        let path = self.artifact_path(info_hash, kind);
        match fs::metadata(&path) {
            Ok(metadata) => {
                let len = metadata.len();
                if len < kind.min_usable_len() {
                    Ok(ArtifactState::Corrupt { len })
                } else {
                    Ok(ArtifactState::Usable { len })
                }
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(ArtifactState::Absent),
            Err(source) => Err(ResumeStoreError::io("resume.classify", path, source)),
        }
    }

    /// Integrity verdicts for every artifact a torrent may own.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] when a file's metadata cannot be
    /// read for a reason other than absence.
    pub fn report(&self, info_hash: InfoHash) -> Result<ArtifactReport, ResumeStoreError> {
        Ok(ArtifactReport {
            info_hash,
            fastresume: self.classify(info_hash, ArtifactKind::FastResume)?,
            metadata: self.classify(info_hash, ArtifactKind::Metadata)?,
            magnet: self.classify(info_hash, ArtifactKind::Magnet)?,
        })
    }

    /// Read the marker from the last clean shutdown.
    ///
    /// A missing marker yields `None`; an unreadable one is logged and
    /// treated as missing so a corrupted marker can never block startup.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Io`] for failures other than absence.
    pub fn read_session_marker(&self) -> Result<Option<SessionMarker>, ResumeStoreError> {
        let path = self.root.join(SESSION_MARKER_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ResumeStoreError::io("resume.marker_read", path, source)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(marker) => Ok(Some(marker)),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "session marker unreadable, ignoring"
                );
                Ok(None)
            }
        }
    }

    /// Record the download path of a clean shutdown, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ResumeStoreError::Serialize`] when encoding fails and
    /// [`ResumeStoreError::Io`] when the write fails.
    pub fn write_session_marker(&self, download_path: &Path) -> Result<(), ResumeStoreError> {
        let marker = SessionMarker {
            download_path: download_path.to_path_buf(),
            saved_at: Utc::now(),
        };
        let payload = serde_json::to_vec_pretty(&marker)
            .map_err(|source| ResumeStoreError::serialize("resume.marker_write", source))?;
        self.write_atomic(SESSION_MARKER_FILE, &payload, "resume.marker_write")
    }

    fn write_atomic(
        &self,
        file_name: &str,
        payload: &[u8],
        operation: &'static str,
    ) -> Result<(), ResumeStoreError> {
        let staged = self.root.join(format!(".{file_name}.tmp"));
        let target = self.root.join(file_name);
        fs::write(&staged, payload)
            .map_err(|source| ResumeStoreError::io(operation, staged.clone(), source))?;
        if let Err(source) = fs::rename(&staged, &target) {
            let _ = fs::remove_file(&staged);
            return Err(ResumeStoreError::io(operation, target, source));
        }
        Ok(())
    }
}

fn artifact_file_name(info_hash: InfoHash, kind: ArtifactKind) -> String {
    format!("{info_hash}.{}", kind.extension())
}
