//! `ruleforge sync` — export the canonical rules to every configured format.

use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use ruleforge_sync::{sync, ChecksumHandler, ManualEdit, Resolution, SyncOptions, SyncOutcome};

use super::load_context;

/// Arguments for `ruleforge sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Show what would be written without actually writing any files.
    #[arg(long)]
    pub dry_run: bool,

    /// Bypass the lockfile guard and overwrite manually edited exports.
    #[arg(long)]
    pub force: bool,

    /// Delete stale exports instead of only listing them.
    #[arg(long)]
    pub clean: bool,

    /// Overwrite manually edited exports without prompting.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Asks on the terminal what to do about each manual edit.
struct PromptHandler;

impl ChecksumHandler for PromptHandler {
    fn resolve(&mut self, edit: &ManualEdit) -> Resolution {
        eprint!(
            "{} {} was edited by hand. [o]verwrite, [k]eep, [a]bort? ",
            "?".yellow().bold(),
            edit.path.display()
        );
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return Resolution::Abort;
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "o" | "overwrite" => Resolution::Overwrite,
            "k" | "keep" => Resolution::Keep,
            _ => Resolution::Abort,
        }
    }
}

impl SyncArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let interactive = !self.yes && std::io::stdin().is_terminal();
        let options = SyncOptions {
            dry_run: self.dry_run,
            force: self.force,
            clean: self.clean,
            interactive,
        };
        let ctx = load_context(root, options)?;

        let handler: Option<Box<dyn ChecksumHandler>> = if self.yes {
            Some(Box::new(|_: &ManualEdit| Resolution::Overwrite))
        } else if interactive {
            Some(Box::new(PromptHandler))
        } else {
            None
        };

        let outcome = sync(&ctx, handler).context("sync failed")?;
        print_outcome(&outcome);
        if !outcome.success {
            bail!("sync finished with errors");
        }
        Ok(())
    }
}

fn print_outcome(outcome: &SyncOutcome) {
    let prefix = if outcome.dry_run { "[dry-run] " } else { "" };

    for conflict in &outcome.conflicts {
        println!(
            "{} '{}' defined in {} files; using {}",
            "!".yellow(),
            conflict.heading,
            conflict.candidates.len(),
            conflict.winner.display()
        );
    }

    for result in &outcome.exporters {
        if let Some(error) = &result.error {
            println!("{prefix}{} {}: {}", "✗".red(), result.exporter, error);
            continue;
        }
        if result.files_written.is_empty() {
            println!("{prefix}✓ {} — nothing to do", result.exporter);
        } else {
            println!(
                "{prefix}✓ {} ({} written)",
                result.exporter,
                result.files_written.len()
            );
        }
        let marker = if outcome.dry_run { "~" } else { "✎" };
        for path in &result.files_written {
            println!("  {marker}  {}", path.display());
        }
        for note in &result.fidelity_notes {
            println!("  {}  {}", "·".bright_black(), note.bright_black());
        }
    }

    if let Some(report) = &outcome.cleaned {
        for path in &report.deleted {
            println!("  {}  {path}", "✗".red());
        }
    }
    for warning in &outcome.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }
    println!("bundle {} ({})", outcome.bundle_hash, outcome.drift);
}
