#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "vl: edit history for visit records",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides --json and VISITLOG_FORMAT).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// History database path (overrides VISITLOG_DB and config).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Capture",
        about = "Record the edits between two visit states",
        long_about = "Detect content changes between two states of a visit, append them as history events, and compact full batches into snapshots.",
        after_help = "EXAMPLES:\n    # Record an agenda edit\n    vl record visit-42 --before '{\"agenda\":\"Plan A\"}' --after '{\"agenda\":\"Plan B\"}' --user-id u-1 --user-name \"Dana\"\n\n    # Read states from files\n    vl record visit-42 --before @old.json --after @new.json --user-id u-1 --user-name Dana"
    )]
    Record(cmd::record::RecordArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show recent edits and snapshots",
        long_about = "Show the uncompacted recent edits (newest first) and all snapshots (highest version first).",
        after_help = "EXAMPLES:\n    # Show history\n    vl history visit-42\n\n    # Emit machine-readable output\n    vl history visit-42 --json"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "List the events inside one snapshot",
        after_help = "EXAMPLES:\n    # Expand a snapshot\n    vl expand visit-42 snap-3f2a91c0d4e5"
    )]
    Expand(cmd::history::ExpandArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Compact full batches into snapshots now",
        after_help = "EXAMPLES:\n    # Compact with the configured batch size\n    vl compact visit-42\n\n    # Backfill with a different batch size\n    vl compact visit-42 --batch-size 20"
    )]
    Compact(cmd::compact::CompactArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Delete all history for a visit",
        after_help = "EXAMPLES:\n    # Erase history (requires confirmation)\n    vl erase visit-42 --yes"
    )]
    Erase(cmd::erase::EraseArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Check stored history for integrity problems",
        after_help = "EXAMPLES:\n    # Verify one visit\n    vl verify visit-42\n\n    # Machine-readable findings\n    vl verify visit-42 --json"
    )]
    Verify(cmd::verify::VerifyArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("VISITLOG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "visitlog=debug,info"
        } else {
            "visitlog=info,warn"
        })
    });

    let format = env::var("VISITLOG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    let db = cli.db.as_deref();
    debug!(?output, root = %project_root.display(), "starting vl");

    match cli.command {
        Commands::Record(ref args) => cmd::record::run_record(args, output, &project_root, db),
        Commands::History(ref args) => cmd::history::run_history(args, output, &project_root, db),
        Commands::Expand(ref args) => cmd::history::run_expand(args, output, &project_root, db),
        Commands::Compact(ref args) => cmd::compact::run_compact(args, output, &project_root, db),
        Commands::Erase(ref args) => cmd::erase::run_erase(args, output, &project_root, db),
        Commands::Verify(ref args) => cmd::verify::run_verify(args, output, &project_root, db),
    }
}
