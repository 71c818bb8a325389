//! ruleforge — keep one canonical rule set in sync with every coding agent.
//!
//! # Usage
//!
//! ```text
//! ruleforge sync [--dry-run] [--force] [--clean] [--yes]
//! ruleforge check [--json]
//! ruleforge diff
//! ruleforge overlays [--json]
//! ruleforge approve [--by NAME]
//! ruleforge exporters [--json]
//! ruleforge hash [--rules]
//! ```
//!
//! Every command accepts `--cwd <dir>` (default: current directory).
//! Set `RUST_LOG=debug` for per-file logging.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    approve::ApproveArgs, check::CheckArgs, diff::DiffArgs, exporters::ExportersArgs,
    hash::HashArgs, overlays::OverlaysArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ruleforge",
    version,
    about = "Sync one canonical set of coding-agent rules into every agent's format",
    long_about = None,
)]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export the canonical rules to every configured format.
    Sync(SyncArgs),

    /// Report drift, pending writes, manual edits and stale exports.
    Check(CheckArgs),

    /// Show a unified diff of what sync would write.
    Diff(DiffArgs),

    /// Show what each configured overlay changes.
    Overlays(OverlaysArgs),

    /// Approve the current bundle hash in the allow-list.
    Approve(ApproveArgs),

    /// List available exporters.
    Exporters(ExportersArgs),

    /// Print the bundle hash of the resolved rules.
    Hash(HashArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let root = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("could not determine current directory")?,
    };

    match cli.command {
        Commands::Sync(args) => args.run(&root),
        Commands::Check(args) => args.run(&root),
        Commands::Diff(args) => args.run(&root),
        Commands::Overlays(args) => args.run(&root),
        Commands::Approve(args) => args.run(&root),
        Commands::Exporters(args) => args.run(),
        Commands::Hash(args) => args.run(&root),
    }
}
