//! The `check` command: reports what is on disk and what can be reattached.

use serde::Serialize;

use ebbtide_core::{InfoHash, parse_magnet};
use ebbtide_resume::{ArtifactKind, ArtifactReport, ArtifactState, ResumeStore};

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use crate::output::render_check_report;

/// One torrent's verdicts, as rendered by `check`.
#[derive(Debug, Serialize)]
pub(crate) struct CheckEntry {
    pub(crate) info_hash: InfoHash,
    pub(crate) name: Option<String>,
    pub(crate) stored_bytes: u64,
    pub(crate) fastresume: ArtifactState,
    pub(crate) metadata: ArtifactState,
    pub(crate) magnet: ArtifactState,
    pub(crate) resumable: bool,
}

/// Counts across the whole store.
#[derive(Debug, Default, Serialize)]
pub(crate) struct CheckSummary {
    pub(crate) total: usize,
    pub(crate) resumable: usize,
    pub(crate) with_metadata: usize,
    pub(crate) corrupt_artifacts: usize,
}

/// Full report: one entry per torrent plus the summary counts.
#[derive(Debug, Serialize)]
pub(crate) struct CheckReport {
    pub(crate) entries: Vec<CheckEntry>,
    pub(crate) summary: CheckSummary,
}

pub(crate) fn handle_check(store: &ResumeStore, output: OutputFormat) -> CliResult<()> {
    let report = build_report(store)?;
    render_check_report(&report, output)
}

pub(crate) fn build_report(store: &ResumeStore) -> CliResult<CheckReport> {
    let identifiers = store.list_identifiers().map_err(CliError::failure)?;

    let mut entries = Vec::with_capacity(identifiers.len());
    let mut summary = CheckSummary::default();
    for info_hash in identifiers {
        let report = store.report(info_hash).map_err(CliError::failure)?;
        let entry = CheckEntry {
            info_hash,
            name: display_name(store, &report),
            stored_bytes: stored_bytes(&report),
            fastresume: report.fastresume,
            metadata: report.metadata,
            magnet: report.magnet,
            resumable: is_resumable(&report),
        };
        summary.total += 1;
        if entry.resumable {
            summary.resumable += 1;
        }
        if entry.metadata.is_usable() {
            summary.with_metadata += 1;
        }
        summary.corrupt_artifacts += report.corrupt_kinds().len();
        entries.push(entry);
    }

    Ok(CheckReport { entries, summary })
}

/// A torrent can be reattached when its resume payload is intact and either
/// the metadata or the magnet fallback survives to identify the content.
fn is_resumable(report: &ArtifactReport) -> bool {
    report.usable(ArtifactKind::FastResume)
        && (report.usable(ArtifactKind::Metadata) || report.usable(ArtifactKind::Magnet))
}

/// Best-effort name from the magnet fallback's `dn` parameter. Metadata
/// artifacts are bencoded and are not decoded here.
fn display_name(store: &ResumeStore, report: &ArtifactReport) -> Option<String> {
    if !report.usable(ArtifactKind::Magnet) {
        return None;
    }
    let bytes = store.read(report.info_hash, ArtifactKind::Magnet).ok()??;
    let uri = String::from_utf8(bytes).ok()?;
    parse_magnet(&uri).ok()?.display_name
}

fn stored_bytes(report: &ArtifactReport) -> u64 {
    ArtifactKind::ALL
        .into_iter()
        .map(|kind| artifact_len(report.state(kind)))
        .sum()
}

const fn artifact_len(state: ArtifactState) -> u64 {
    match state {
        ArtifactState::Usable { len } | ArtifactState::Corrupt { len } => len,
        ArtifactState::Absent => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_hash(tag: u8) -> InfoHash {
        InfoHash::parse(&format!("{tag:040x}")).expect("sample digest is valid")
    }

    fn new_store() -> (TempDir, ResumeStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = ResumeStore::new(dir.path());
        store.ensure_initialized().expect("init");
        (dir, store)
    }

    #[test]
    fn empty_store_yields_empty_report() {
        let (_dir, store) = new_store();
        let report = build_report(&store).expect("report");
        assert!(report.entries.is_empty());
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.resumable, 0);
    }

    #[test]
    fn report_classifies_and_counts() {
        let (_dir, store) = new_store();
        let complete = sample_hash(1);
        let resume_only = sample_hash(2);
        let truncated = sample_hash(3);
        let named_magnet = format!("magnet:?xt=urn:btih:{complete}&dn=Example%20Iso");

        store
            .write(complete, ArtifactKind::FastResume, &[0_u8; 64])
            .expect("write");
        store
            .write(complete, ArtifactKind::Metadata, &[0_u8; 200])
            .expect("write");
        store
            .write(complete, ArtifactKind::Magnet, named_magnet.as_bytes())
            .expect("write");
        store
            .write(resume_only, ArtifactKind::FastResume, &[0_u8; 64])
            .expect("write");
        store
            .write(truncated, ArtifactKind::FastResume, &[0_u8; 5])
            .expect("write");
        store
            .write(
                truncated,
                ArtifactKind::Magnet,
                format!("magnet:?xt=urn:btih:{truncated}").as_bytes(),
            )
            .expect("write");

        let report = build_report(&store).expect("report");
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.resumable, 1);
        assert_eq!(report.summary.with_metadata, 1);
        assert_eq!(report.summary.corrupt_artifacts, 1);

        let by_hash = |hash: InfoHash| {
            report
                .entries
                .iter()
                .find(|entry| entry.info_hash == hash)
                .expect("entry present")
        };
        let magnet_len = u64::try_from(named_magnet.len()).expect("length fits");
        assert!(by_hash(complete).resumable);
        assert_eq!(by_hash(complete).name.as_deref(), Some("Example Iso"));
        assert_eq!(by_hash(complete).stored_bytes, 64 + 200 + magnet_len);
        assert!(!by_hash(resume_only).resumable);
        assert!(by_hash(resume_only).name.is_none());
        assert!(!by_hash(truncated).resumable);
        assert!(by_hash(truncated).fastresume.is_corrupt());
    }

    #[test]
    fn resume_with_magnet_but_no_metadata_still_counts_as_resumable() {
        let (_dir, store) = new_store();
        let hash = sample_hash(4);
        store
            .write(hash, ArtifactKind::FastResume, &[0_u8; 32])
            .expect("write");
        store
            .write(
                hash,
                ArtifactKind::Magnet,
                format!("magnet:?xt=urn:btih:{hash}").as_bytes(),
            )
            .expect("write");

        let report = build_report(&store).expect("report");
        assert_eq!(report.summary.resumable, 1);
        assert_eq!(report.summary.with_metadata, 0);
    }
}
