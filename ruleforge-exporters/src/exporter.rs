//! The exporter contract.
//!
//! An exporter never touches the filesystem for writing. The caller drives
//! it through an explicit accumulator:
//!
//! ```text
//! let mut acc = exporter.begin();
//! for (scope, rules) in scopes {
//!     exporter.accumulate(&mut acc, &ExportRequest { scope, rules });
//! }
//! let rendered = exporter.finalize(acc, &options)?;
//! ```
//!
//! `finalize` may read previously written output under
//! [`ExportOptions::output_root`] so merging formats can keep content they
//! do not own. Writing the returned files is the caller's job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ruleforge_core::{Rule, Scope};

use crate::error::ExportError;

// ---------------------------------------------------------------------------
// Descriptor & manifest
// ---------------------------------------------------------------------------

/// What an exporter is structurally able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// One output file per rule.
    pub multi_file: bool,
    /// Output depends on which scope a rule belongs to.
    pub scope_aware: bool,
    /// Content on disk that the exporter does not own survives a re-run.
    pub preserves_content: bool,
}

/// Static identity of a registered exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: Capabilities,
    /// Project-relative globs covering every file the exporter may emit.
    pub output_path_globs: Vec<String>,
    /// Features this format is known to lose, independent of content.
    pub known_gaps: Vec<&'static str>,
}

impl ExporterDescriptor {
    pub fn manifest(&self) -> ExporterManifest {
        ExporterManifest {
            name: self.name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: self.description.to_string(),
            output_path_globs: self.output_path_globs.clone(),
            fidelity_notes: self.known_gaps.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Machine-readable description consumed by health-check tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub output_path_globs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fidelity_notes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Request / options / accumulator
// ---------------------------------------------------------------------------

/// Canonical rules belonging to one resolved scope.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    pub scope: &'a Scope,
    pub rules: &'a [Rule],
}

/// Per-run options shared by every exporter.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Project root that relative output paths are resolved against.
    pub output_root: PathBuf,
    pub dry_run: bool,
    /// This exporter's knobs from `exporter_config`; `Null` when unset.
    pub knobs: Value,
}

impl ExportOptions {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        ExportOptions {
            output_root: output_root.into(),
            dry_run: false,
            knobs: Value::Null,
        }
    }

    pub fn with_knobs(mut self, knobs: Value) -> Self {
        self.knobs = knobs;
        self
    }

    /// String knob `key`, if set.
    pub fn knob_str(&self, key: &str) -> Option<&str> {
        self.knobs.get(key).and_then(Value::as_str)
    }

    pub fn resolve(&self, rel: &Path) -> PathBuf {
        self.output_root.join(rel)
    }
}

/// One scope's worth of accumulated rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRules {
    pub scope: Scope,
    pub rules: Vec<Rule>,
}

/// Explicit state threaded through `accumulate` calls. A fresh accumulator
/// is the reset state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    scopes: Vec<ScopeRules>,
}

impl Accumulator {
    /// Record `request`. A scope seen twice has its rules appended.
    pub fn push(&mut self, request: &ExportRequest<'_>) {
        match self.scopes.iter_mut().find(|s| s.scope == *request.scope) {
            Some(existing) => existing.rules.extend(request.rules.iter().cloned()),
            None => self.scopes.push(ScopeRules {
                scope: request.scope.clone(),
                rules: request.rules.to_vec(),
            }),
        }
    }

    pub fn scopes(&self) -> &[ScopeRules] {
        &self.scopes
    }

    /// Every accumulated rule with its scope, in accumulation order.
    pub fn rules(&self) -> impl Iterator<Item = (&Scope, &Rule)> {
        self.scopes
            .iter()
            .flat_map(|s| s.rules.iter().map(move |r| (&s.scope, r)))
    }

    /// Scopes that contributed at least one rule.
    pub fn populated_scopes(&self) -> usize {
        self.scopes.iter().filter(|s| !s.rules.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(|s| s.rules.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One file an exporter wants on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Path relative to [`ExportOptions::output_root`], `/`-separated.
    pub path: PathBuf,
    pub content: String,
}

/// Everything an exporter produced for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub files: Vec<RenderedFile>,
    pub fidelity_notes: Vec<String>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A target format.
pub trait Exporter {
    fn descriptor(&self) -> &ExporterDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Fresh accumulator for a new run.
    fn begin(&self) -> Accumulator {
        Accumulator::default()
    }

    fn accumulate(&self, acc: &mut Accumulator, request: &ExportRequest<'_>) {
        acc.push(request);
    }

    /// Render everything accumulated, merging against existing output.
    fn finalize(&self, acc: Accumulator, options: &ExportOptions) -> Result<Rendered, ExportError>;
}

/// Read `path` if it exists; `None` when absent.
pub(crate) fn read_existing(path: &Path) -> Result<Option<String>, ExportError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.replace("\r\n", "\n"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(crate::error::io_err(path, e)),
    }
}
