//! `ruleforge overlays` — what each configured overlay changes.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use ruleforge_core::Document;
use ruleforge_sync::conflict::{collect_sources, resolve};
use ruleforge_sync::overlay::diff_overlays;
use ruleforge_sync::SyncOptions;

use super::load_context;

/// Arguments for `ruleforge overlays`.
#[derive(Args, Debug)]
pub struct OverlaysArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

fn show(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "(absent)".bright_black().to_string(),
    }
}

impl OverlaysArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let ctx = load_context(root, SyncOptions::default())?;
        let sources = collect_sources(&ctx.root, &ctx.config.sources).context("failed to read rules")?;
        let merged = resolve(&sources.files).context("failed to merge rules")?;
        let doc = Document::new(ctx.config.pack_meta(), merged.rules);
        let report = diff_overlays(&doc, &ctx.config.overlays);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize overlays")?
            );
        } else if ctx.config.overlays.is_empty() {
            println!("No overlays configured.");
        } else {
            for overlay in &report.overlays {
                println!("#{} {}", overlay.index, overlay.selector.bold());
                for change in &overlay.changes {
                    let after = match &change.after {
                        Some(v) => v.to_string(),
                        None => "(removed)".red().to_string(),
                    };
                    println!(
                        "  {} {}: {} → {}",
                        change.rule_id,
                        change.key,
                        show(&change.before),
                        after
                    );
                }
            }
            println!("{} property change(s)", report.changed);
        }

        if !report.errors.is_empty() {
            for error in &report.errors {
                eprintln!("{} {error}", "✗".red());
            }
            bail!("{} overlay error(s)", report.errors.len());
        }
        Ok(())
    }
}
