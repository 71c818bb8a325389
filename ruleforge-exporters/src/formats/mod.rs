//! Format families.

pub mod config_merge;
pub mod merged;
pub mod rule_dir;

pub use config_merge::{ConfigMergeExporter, CONFIG_TARGETS};
pub use merged::{MergedMarkdownExporter, ScopePrefix, MERGED_TARGETS};
pub use rule_dir::{RuleDirExporter, DIALECTS};
