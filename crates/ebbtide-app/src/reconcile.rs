//! Startup reconciliation between the resume store and a fresh session.
//!
//! Every identifier with artifacts on disk is planned into one of four
//! branches and reattached through the orchestrator. Failures are isolated
//! per identifier, so one broken artifact set never blocks the rest of the
//! session from coming back.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use ebbtide_core::{InfoHash, TorrentEngine, parse_magnet};
use ebbtide_resume::{ArtifactKind, ArtifactReport, ResumeStore, SessionMarker};
use tracing::{debug, info, warn};

use crate::orchestrator::TorrentOrchestrator;

/// Default wait for metadata after a magnet-only reattach.
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding the metadata wait, in whole seconds.
const METADATA_TIMEOUT_VAR: &str = "EBBTIDE_METADATA_TIMEOUT_SECS";

/// Reattachment decision for one identifier, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReattachBranch {
    /// Metadata plus a trusted resume payload; a recheck reconciles the
    /// payload against whatever is on disk.
    ResumeWithMetadata,
    /// Metadata only; the download is re-verified from scratch.
    MetadataOnly,
    /// Magnet fallback only; metadata must be fetched from the network.
    MagnetPending,
    /// Nothing usable; artifacts stay on disk untouched.
    Skip,
}

impl ReattachBranch {
    /// Short label for log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ResumeWithMetadata => "resume",
            Self::MetadataOnly => "recheck",
            Self::MagnetPending => "magnet",
            Self::Skip => "skip",
        }
    }
}

/// Decide how one identifier's artifacts come back into the session.
///
/// `stale_resume` demotes an otherwise trusted resume payload to a full
/// re-verification, used when the download path changed between runs.
#[must_use]
pub fn plan_branch(report: &ArtifactReport, stale_resume: bool) -> ReattachBranch {
    if report.metadata.is_usable() {
        if report.fastresume.is_usable() && !stale_resume {
            ReattachBranch::ResumeWithMetadata
        } else {
            ReattachBranch::MetadataOnly
        }
    } else if report.magnet.is_usable() {
        ReattachBranch::MagnetPending
    } else {
        ReattachBranch::Skip
    }
}

/// Whether stored resume payloads predate a download path change.
///
/// With no recorded marker the payloads are trusted as-is; the forced
/// recheck still reconciles the piece bitfield against the disk.
#[must_use]
pub fn resume_is_stale(marker: Option<&SessionMarker>, download_path: &Path) -> bool {
    marker.is_some_and(|marker| marker.download_path != download_path)
}

/// Outcome of one reconciliation pass, bucketed by branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReattachSummary {
    /// Reattached with metadata and a resume payload.
    pub resumed: Vec<InfoHash>,
    /// Reattached metadata-only, re-verified from scratch.
    pub rechecked: Vec<InfoHash>,
    /// Reattached by magnet, metadata still in flight.
    pub fetching_metadata: Vec<InfoHash>,
    /// No usable artifacts, left on disk.
    pub skipped: Vec<InfoHash>,
    /// Identifiers that failed partway and were abandoned for this run.
    pub failed: Vec<InfoHash>,
}

impl ReattachSummary {
    /// Torrents actually handed back to the session.
    #[must_use]
    pub const fn reattached(&self) -> usize {
        self.resumed.len() + self.rechecked.len() + self.fetching_metadata.len()
    }
}

/// Metadata wait for magnet-only reattachments, honouring the environment
/// override.
#[must_use]
pub fn metadata_timeout() -> Duration {
    metadata_timeout_from(std::env::var(METADATA_TIMEOUT_VAR).ok().as_deref())
}

fn metadata_timeout_from(value: Option<&str>) -> Duration {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map_or(DEFAULT_METADATA_TIMEOUT, Duration::from_secs)
}

/// Reattach every identifier found in the resume store.
///
/// Decisions follow [`plan_branch`]. A failure on one identifier is logged
/// and recorded in the summary without blocking the others; its artifacts
/// stay on disk for the next run. Magnet-only reattachments get a watchdog
/// that abandons the attempt when metadata has not arrived within
/// `metadata_timeout`, again leaving the artifacts for the next run.
pub async fn reconcile_session<E>(
    store: &ResumeStore,
    orchestrator: &Arc<TorrentOrchestrator<E>>,
    download_path: &Path,
    metadata_timeout: Duration,
) -> ReattachSummary
where
    E: TorrentEngine + 'static,
{
    let identifiers = match store.list_identifiers() {
        Ok(identifiers) => identifiers,
        Err(err) => {
            warn!(error = %err, "resume store unreadable, starting with an empty session");
            return ReattachSummary::default();
        }
    };
    if identifiers.is_empty() {
        debug!("resume store holds no artifacts");
        return ReattachSummary::default();
    }

    let marker = store.read_session_marker().unwrap_or_else(|err| {
        warn!(error = %err, "session marker unreadable, treating resume payloads as fresh");
        None
    });
    let stale = resume_is_stale(marker.as_ref(), download_path);
    if stale {
        info!(
            download_path = %download_path.display(),
            "download path changed since the last run, resume payloads will be re-verified"
        );
    }

    let mut summary = ReattachSummary::default();
    for info_hash in identifiers {
        let report = match store.report(info_hash) {
            Ok(report) => report,
            Err(err) => {
                warn!(info_hash = %info_hash, error = %err, "artifact inspection failed, skipping");
                summary.failed.push(info_hash);
                continue;
            }
        };
        let branch = plan_branch(&report, stale);
        match apply_branch(store, orchestrator, info_hash, branch, metadata_timeout).await {
            Ok(()) => match branch {
                ReattachBranch::ResumeWithMetadata => summary.resumed.push(info_hash),
                ReattachBranch::MetadataOnly => summary.rechecked.push(info_hash),
                ReattachBranch::MagnetPending => summary.fetching_metadata.push(info_hash),
                ReattachBranch::Skip => summary.skipped.push(info_hash),
            },
            Err(err) => {
                warn!(
                    info_hash = %info_hash,
                    branch = branch.label(),
                    error = %err,
                    "reattach failed, leaving artifacts on disk"
                );
                summary.failed.push(info_hash);
            }
        }
    }
    summary
}

async fn apply_branch<E>(
    store: &ResumeStore,
    orchestrator: &Arc<TorrentOrchestrator<E>>,
    info_hash: InfoHash,
    branch: ReattachBranch,
    metadata_timeout: Duration,
) -> Result<()>
where
    E: TorrentEngine + 'static,
{
    match branch {
        ReattachBranch::ResumeWithMetadata => {
            let metadata = read_artifact(store, info_hash, ArtifactKind::Metadata)?;
            let fastresume = read_artifact(store, info_hash, ArtifactKind::FastResume)?;
            orchestrator
                .reattach(info_hash, metadata, Some(fastresume))
                .await?;
            info!(info_hash = %info_hash, "reattached with resume payload");
        }
        ReattachBranch::MetadataOnly => {
            let metadata = read_artifact(store, info_hash, ArtifactKind::Metadata)?;
            orchestrator.reattach(info_hash, metadata, None).await?;
            info!(info_hash = %info_hash, "reattached for full re-verification");
        }
        ReattachBranch::MagnetPending => {
            let uri = magnet_artifact(store, info_hash)?;
            orchestrator.add_magnet(&uri).await?;
            info!(info_hash = %info_hash, "reattached by magnet, awaiting metadata");
            spawn_metadata_watchdog(Arc::clone(orchestrator), info_hash, metadata_timeout);
        }
        ReattachBranch::Skip => {
            info!(info_hash = %info_hash, "no usable artifacts, skipping reattach");
        }
    }
    Ok(())
}

/// Load and validate the magnet fallback, confirming it names the same
/// torrent as the artifact stem.
fn magnet_artifact(store: &ResumeStore, info_hash: InfoHash) -> Result<String> {
    let bytes = read_artifact(store, info_hash, ArtifactKind::Magnet)?;
    let uri = String::from_utf8(bytes).context("magnet artifact is not UTF-8")?;
    let magnet = parse_magnet(&uri)?;
    if magnet.info_hash != info_hash {
        bail!(
            "magnet artifact names {} instead of {info_hash}",
            magnet.info_hash
        );
    }
    Ok(magnet.uri)
}

fn read_artifact(store: &ResumeStore, info_hash: InfoHash, kind: ArtifactKind) -> Result<Vec<u8>> {
    store.read(info_hash, kind)?.ok_or_else(|| {
        anyhow!(
            "{} artifact disappeared before it could be read",
            kind.label()
        )
    })
}

/// Abandon a magnet reattach when metadata has not arrived within the
/// timeout. The artifacts survive, so the next run retries the magnet.
fn spawn_metadata_watchdog<E>(
    orchestrator: Arc<TorrentOrchestrator<E>>,
    info_hash: InfoHash,
    timeout: Duration,
) where
    E: TorrentEngine + 'static,
{
    let _ = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        match orchestrator.abandon_pending(info_hash).await {
            Ok(true) => {
                warn!(
                    info_hash = %info_hash,
                    timeout_secs = timeout.as_secs(),
                    "metadata never arrived, abandoning the reattach"
                );
            }
            Ok(false) => {}
            Err(err) => {
                warn!(info_hash = %info_hash, error = %err, "failed to abandon a stalled reattach");
            }
        }
    });
}
