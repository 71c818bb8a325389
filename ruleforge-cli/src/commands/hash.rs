//! `ruleforge hash` — print the bundle hash of the resolved rules.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use ruleforge_sync::lockfile::bundle;
use ruleforge_sync::pipeline::resolve_document;
use ruleforge_sync::SyncOptions;

use super::load_context;

/// Arguments for `ruleforge hash`.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Also print each rule's hash.
    #[arg(long)]
    pub rules: bool,
}

impl HashArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let ctx = load_context(root, SyncOptions::default())?;
        let resolved = resolve_document(&ctx).context("failed to resolve rules")?;
        let lock = bundle(&resolved.document, ctx.config.lockfile.mode)?;

        println!("{}", lock.bundle_hash);
        if self.rules {
            for (id, hash) in &lock.rules {
                println!("{hash}  {id}");
            }
        }
        Ok(())
    }
}
