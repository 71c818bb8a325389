//! `ruleforge approve` — add the current bundle hash to the allow-list.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use ruleforge_sync::lockfile::{approve, bundle};
use ruleforge_sync::pipeline::resolve_document;
use ruleforge_sync::SyncOptions;

use super::load_context;

/// Arguments for `ruleforge approve`.
#[derive(Args, Debug)]
pub struct ApproveArgs {
    /// Who approved the bundle (defaults to $USER).
    #[arg(long, value_name = "NAME")]
    pub by: Option<String>,
}

impl ApproveArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let ctx = load_context(root, SyncOptions::default())?;
        let resolved = resolve_document(&ctx).context("failed to resolve rules")?;
        let lock = bundle(&resolved.document, ctx.config.lockfile.mode)?;

        let by = self
            .by
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());

        if approve(&ctx.root, &lock.bundle_hash, &by).context("failed to update allow-list")? {
            println!("✓ approved {} ({by})", lock.bundle_hash);
        } else {
            println!("✓ {} is already approved", lock.bundle_hash);
        }
        Ok(())
    }
}
