//! `ruleforge diff` — show unified diffs for what sync would write.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use ruleforge_sync::diff::diff;
use ruleforge_sync::SyncOptions;

use super::load_context;

/// Arguments for `ruleforge diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let ctx = load_context(root, SyncOptions::default())?;
        let report = diff(&ctx).context("diff failed")?;

        for (exporter, error) in &report.failures {
            eprintln!("{} {exporter}: {error}", "✗".red());
        }
        if report.diffs.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        for diff in report.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
