pub mod approve;
pub mod check;
pub mod diff;
pub mod exporters;
pub mod hash;
pub mod overlays;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use ruleforge_sync::{SyncContext, SyncOptions};

/// Load the project config under `root`.
pub fn load_context(root: &Path, options: SyncOptions) -> Result<SyncContext> {
    SyncContext::load(root, options).with_context(|| {
        format!(
            "failed to load ruleforge config in {} (expected .ruleforge/config.yaml)",
            root.display()
        )
    })
}
