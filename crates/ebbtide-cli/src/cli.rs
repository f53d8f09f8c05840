//! Argument parsing and command dispatch for the resume-store tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ebbtide_resume::ResumeStore;

use crate::commands::{check, clean};
use crate::error::{CliError, CliResult};

/// Parses CLI arguments, executes the requested command, and reports
/// failures on stderr. Returns the process exit code.
#[must_use]
pub fn run() -> i32 {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

fn dispatch(cli: Cli) -> CliResult<()> {
    let store = open_store(cli.resume_dir)?;
    match cli.command {
        Command::Check => check::handle_check(&store, cli.output),
        Command::Clean(args) => clean::handle_clean(&store, &args),
    }
}

/// An explicitly requested directory must exist; the default location is
/// allowed to be absent so the tool reports an empty store on a fresh
/// system instead of failing.
fn open_store(resume_dir: Option<PathBuf>) -> CliResult<ResumeStore> {
    let Some(dir) = resume_dir else {
        return Ok(ResumeStore::new(ebbtide_config::default_resume_dir()));
    };
    if !dir.is_dir() {
        return Err(CliError::validation(format!(
            "resume directory '{}' does not exist",
            dir.display()
        )));
    }
    Ok(ResumeStore::new(dir))
}

#[derive(Parser)]
#[command(
    name = "ebbtide-store",
    about = "Maintenance tool for the Ebbtide resume store"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "EBBTIDE_RESUME_DIR",
        help = "Resume store directory (defaults to the per-user config location)"
    )]
    resume_dir: Option<PathBuf>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value = "table",
        help = "Select output format for commands that render structured data"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report per-torrent artifact integrity and resumability.
    Check,
    /// Delete artifacts that fail integrity checks.
    Clean(CleanArgs),
}

#[derive(Args, Default)]
pub(crate) struct CleanArgs {
    #[arg(long, help = "Delete without asking for confirmation")]
    pub(crate) yes: bool,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}
