//! The `clean` command: deletes artifacts that fail integrity checks.

use std::io::{self, BufRead, Write};

use anyhow::anyhow;

use ebbtide_core::InfoHash;
use ebbtide_resume::{ArtifactKind, ArtifactState, ResumeStore};

use crate::cli::CleanArgs;
use crate::error::{CliError, CliResult};
use crate::output::format_bytes;

/// One artifact slated for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CorruptArtifact {
    pub(crate) info_hash: InfoHash,
    pub(crate) kind: ArtifactKind,
    pub(crate) len: u64,
}

pub(crate) fn handle_clean(store: &ResumeStore, args: &CleanArgs) -> CliResult<()> {
    let corrupt = collect_corrupt(store)?;
    if corrupt.is_empty() {
        println!("no corrupt artifacts found");
        return Ok(());
    }

    println!("found {} corrupt artifact(s):", corrupt.len());
    for artifact in &corrupt {
        println!(
            "  {}.{} ({})",
            artifact.info_hash,
            artifact.kind.extension(),
            format_bytes(artifact.len)
        );
    }

    if !args.yes && !confirm_deletion()? {
        println!("cancelled, nothing deleted");
        return Ok(());
    }

    let failed = delete_artifacts(store, &corrupt);
    println!("deleted {} artifact(s)", corrupt.len() - failed);
    if failed > 0 {
        return Err(CliError::failure(anyhow!(
            "failed to delete {failed} artifact(s)"
        )));
    }
    Ok(())
}

/// Every present-but-unusable artifact in the store, in listing order.
pub(crate) fn collect_corrupt(store: &ResumeStore) -> CliResult<Vec<CorruptArtifact>> {
    let mut corrupt = Vec::new();
    for info_hash in store.list_identifiers().map_err(CliError::failure)? {
        let report = store.report(info_hash).map_err(CliError::failure)?;
        for kind in ArtifactKind::ALL {
            if let ArtifactState::Corrupt { len } = report.state(kind) {
                corrupt.push(CorruptArtifact {
                    info_hash,
                    kind,
                    len,
                });
            }
        }
    }
    Ok(corrupt)
}

/// Delete each artifact independently so one failure cannot stop the
/// sweep. Returns the number of failed deletions.
pub(crate) fn delete_artifacts(store: &ResumeStore, artifacts: &[CorruptArtifact]) -> usize {
    let mut failed = 0;
    for artifact in artifacts {
        if let Err(err) = store.delete(artifact.info_hash, artifact.kind) {
            eprintln!(
                "failed to delete {}.{}: {:#}",
                artifact.info_hash,
                artifact.kind.extension(),
                anyhow::Error::from(err)
            );
            failed += 1;
        }
    }
    failed
}

/// Default-deny prompt; only an explicit yes proceeds.
fn confirm_deletion() -> CliResult<bool> {
    print!("delete these artifacts? [y/N]: ");
    io::stdout().flush().map_err(CliError::failure)?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(CliError::failure)?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
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
    fn collect_finds_only_corrupt_artifacts() {
        let (_dir, store) = new_store();
        let healthy = sample_hash(1);
        let broken = sample_hash(2);
        let empty = sample_hash(3);

        store
            .write(healthy, ArtifactKind::FastResume, &[0_u8; 64])
            .expect("write");
        store
            .write(broken, ArtifactKind::FastResume, &[0_u8; 4])
            .expect("write");
        store
            .write(broken, ArtifactKind::Metadata, &[0_u8; 50])
            .expect("write");
        store
            .write(empty, ArtifactKind::Magnet, b"")
            .expect("write");

        let corrupt = collect_corrupt(&store).expect("collect");
        assert_eq!(
            corrupt,
            vec![
                CorruptArtifact {
                    info_hash: broken,
                    kind: ArtifactKind::FastResume,
                    len: 4,
                },
                CorruptArtifact {
                    info_hash: broken,
                    kind: ArtifactKind::Metadata,
                    len: 50,
                },
                CorruptArtifact {
                    info_hash: empty,
                    kind: ArtifactKind::Magnet,
                    len: 0,
                },
            ]
        );
    }

    #[test]
    fn clean_with_yes_removes_corrupt_and_keeps_the_rest() {
        let (_dir, store) = new_store();
        let hash = sample_hash(4);
        store
            .write(hash, ArtifactKind::FastResume, &[0_u8; 4])
            .expect("write");
        store
            .write(hash, ArtifactKind::Metadata, &[0_u8; 200])
            .expect("write");

        handle_clean(&store, &CleanArgs { yes: true }).expect("clean");

        let report = store.report(hash).expect("report");
        assert_eq!(report.fastresume, ArtifactState::Absent);
        assert!(report.metadata.is_usable());
    }

    #[test]
    fn clean_on_a_healthy_store_is_a_no_op() {
        let (_dir, store) = new_store();
        store
            .write(sample_hash(5), ArtifactKind::FastResume, &[0_u8; 64])
            .expect("write");
        handle_clean(&store, &CleanArgs { yes: true }).expect("clean");
        assert_eq!(store.list_identifiers().expect("list").len(), 1);
    }

    #[test]
    fn delete_failures_are_counted_without_stopping_the_sweep() {
        let (dir, store) = new_store();
        let blocked = sample_hash(6);
        let removable = sample_hash(7);

        // A directory squatting on the artifact path makes the unlink fail.
        std::fs::create_dir(dir.path().join(format!("{blocked}.fastresume")))
            .expect("create dir");
        store
            .write(removable, ArtifactKind::FastResume, &[0_u8; 4])
            .expect("write");

        let failed = delete_artifacts(
            &store,
            &[
                CorruptArtifact {
                    info_hash: blocked,
                    kind: ArtifactKind::FastResume,
                    len: 0,
                },
                CorruptArtifact {
                    info_hash: removable,
                    kind: ArtifactKind::FastResume,
                    len: 4,
                },
            ],
        );

        assert_eq!(failed, 1);
        assert!(
            store
                .read(removable, ArtifactKind::FastResume)
                .expect("read")
                .is_none()
        );
    }

    #[test]
    fn confirmation_defaults_to_deny() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("YES\n"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("n\n"));
        assert!(!is_affirmative("nope\n"));
    }
}
