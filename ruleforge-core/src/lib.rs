//! ruleforge core library — canonical rule model, hashing, rule files, config.
//!
//! Public API surface:
//! - [`types`] — rules, documents, scopes
//! - [`canonical`] — canonical JSON serialization and content hashing
//! - [`rule_file`] — front-matter rule files and multi-section sources
//! - [`sections`] — markdown heading/section splitting
//! - [`config`] — `.ruleforge/config.yaml` and project path helpers
//! - [`selector`] — `rule[key=value]` selectors used by overlays
//! - [`error`] — [`CoreError`], [`CanonicalError`]

pub mod canonical;
pub mod config;
pub mod dotted;
pub mod error;
pub mod rule_file;
pub mod scope;
pub mod sections;
pub mod selector;
pub mod types;

pub use error::{CanonicalError, CoreError};
pub use types::{Document, Integrity, PackMeta, Rule, RuleId, Scope, Severity};
