//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;

use ebbtide_resume::ArtifactState;

use crate::cli::OutputFormat;
use crate::commands::check::CheckReport;
use crate::error::{CliError, CliResult};

pub(crate) fn render_check_report(report: &CheckReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(report)
                .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
            println!("{text}");
        }
        OutputFormat::Table => {
            println!(
                "{:<40} {:>10} {:<8} {:<8} {:<8} {:<9} NAME",
                "ID", "SIZE", "RESUME", "METADATA", "MAGNET", "RESUMABLE"
            );
            for entry in &report.entries {
                println!(
                    "{:<40} {:>10} {:<8} {:<8} {:<8} {:<9} {}",
                    entry.info_hash,
                    format_bytes(entry.stored_bytes),
                    state_cell(entry.fastresume),
                    state_cell(entry.metadata),
                    state_cell(entry.magnet),
                    if entry.resumable { "yes" } else { "no" },
                    entry.name.as_deref().unwrap_or("<unknown>")
                );
            }
            println!();
            println!("total: {}", report.summary.total);
            println!("resumable: {}", report.summary.resumable);
            println!("with metadata: {}", report.summary.with_metadata);
            if report.summary.corrupt_artifacts > 0 {
                println!(
                    "corrupt artifacts: {} (run `clean` to remove them)",
                    report.summary.corrupt_artifacts
                );
            }
        }
    }
    Ok(())
}

#[must_use]
pub(crate) const fn state_cell(state: ArtifactState) -> &'static str {
    match state {
        ArtifactState::Usable { .. } => "ok",
        ArtifactState::Corrupt { .. } => "corrupt",
        ArtifactState::Absent => "-",
    }
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}
