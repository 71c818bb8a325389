//! Running exporters and writing what they render.
//!
//! An [`ExportSession`] holds one explicit accumulator per exporter. Every
//! scope is accumulated before any exporter finalizes, so merging exporters
//! see the whole project. Finishing hands each accumulator back to its
//! exporter and leaves a fresh one in its place; [`ExportSession::reset`]
//! does the same without rendering.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use ruleforge_core::canonical::prefixed;
use ruleforge_exporters::{
    Accumulator, ExportOptions, ExportRequest, Exporter, Rendered, RenderedFile,
};

use crate::error::{io_err, SyncError};
use crate::writer::{AtomicWriter, WriteOptions, WriteOutcome};

/// Outcome of one exporter in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    pub exporter: String,
    pub success: bool,
    /// Project-relative paths written (or, in a dry run, that would be).
    pub files_written: Vec<PathBuf>,
    /// Every project-relative path this exporter emitted.
    pub produced: Vec<PathBuf>,
    /// Manually edited files the handler chose to keep.
    pub kept: Vec<PathBuf>,
    /// `sha256:<hex>` over the emitted files.
    pub content_hash: String,
    pub fidelity_notes: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResult {
    fn failed(exporter: &str, error: impl std::fmt::Display) -> Self {
        ExportResult {
            exporter: exporter.to_string(),
            success: false,
            files_written: Vec::new(),
            produced: Vec::new(),
            kept: Vec::new(),
            content_hash: String::new(),
            fidelity_notes: Vec::new(),
            warnings: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// SHA-256 over `(path NUL content NUL)` of `files`, sorted by path.
pub fn content_hash(files: &[RenderedFile]) -> String {
    let mut sorted: Vec<&RenderedFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(slash_path(&file.path).as_bytes());
        hasher.update([0u8]);
        hasher.update(file.content.as_bytes());
        hasher.update([0u8]);
    }
    prefixed(&hex::encode(hasher.finalize()))
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_normalized(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.replace("\r\n", "\n"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// What [`write_rendered`] did.
#[derive(Debug, Default)]
pub struct Written {
    pub files: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Write `rendered` below `options.output_root`, skipping files whose
/// on-disk content already matches. Dry runs only report what would change.
pub fn write_rendered(
    rendered: &Rendered,
    options: &ExportOptions,
    writer: &mut AtomicWriter,
    write_options: WriteOptions,
) -> Result<Written, SyncError> {
    let mut out = Written::default();
    for file in &rendered.files {
        let target = options.resolve(&file.path);
        if read_normalized(&target)?.as_deref() == Some(file.content.as_str()) {
            tracing::debug!("unchanged: {}", target.display());
            if !options.dry_run {
                writer.track(&target)?;
            }
            continue;
        }
        if options.dry_run {
            tracing::info!("would write: {}", target.display());
            out.files.push(file.path.clone());
            continue;
        }
        match writer.write(&target, &file.content, write_options)? {
            WriteOutcome::Written { .. } => out.files.push(file.path.clone()),
            WriteOutcome::Kept { .. } => {
                out.warnings
                    .push(format!("kept manual edit: {}", file.path.display()));
                out.kept.push(file.path.clone());
            }
        }
    }
    Ok(out)
}

/// Turn a finalize result into an [`ExportResult`], writing its files.
///
/// Failures are isolated to the exporter. Only an abort from the
/// manual-edit handler is returned as an error, so the caller can roll
/// back the whole run.
fn complete(
    name: &str,
    rendered: Result<Rendered, ruleforge_exporters::ExportError>,
    options: &ExportOptions,
    writer: &mut AtomicWriter,
    write_options: WriteOptions,
) -> Result<ExportResult, SyncError> {
    let rendered = match rendered {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("{name} failed: {e}");
            return Ok(ExportResult::failed(name, e));
        }
    };
    let written = match write_rendered(&rendered, options, writer, write_options) {
        Ok(w) => w,
        Err(e @ SyncError::Aborted { .. }) => return Err(e),
        Err(e) => {
            tracing::warn!("{name} failed: {e}");
            return Ok(ExportResult::failed(name, e));
        }
    };

    let mut warnings = rendered.warnings.clone();
    warnings.extend(written.warnings);
    Ok(ExportResult {
        exporter: name.to_string(),
        success: true,
        files_written: written.files,
        produced: rendered.files.iter().map(|f| f.path.clone()).collect(),
        kept: written.kept,
        content_hash: content_hash(&rendered.files),
        fidelity_notes: rendered.fidelity_notes,
        warnings,
        error: None,
    })
}

/// Single-call export of one request through one exporter.
pub fn export(
    exporter: &dyn Exporter,
    request: &ExportRequest<'_>,
    options: &ExportOptions,
    writer: &mut AtomicWriter,
    write_options: WriteOptions,
) -> Result<ExportResult, SyncError> {
    let mut acc = exporter.begin();
    exporter.accumulate(&mut acc, request);
    complete(
        exporter.name(),
        exporter.finalize(acc, options),
        options,
        writer,
        write_options,
    )
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Accumulators for a set of exporters across one run.
pub struct ExportSession<'r> {
    exporters: Vec<&'r dyn Exporter>,
    accumulators: Vec<Accumulator>,
}

impl<'r> ExportSession<'r> {
    pub fn new(exporters: Vec<&'r dyn Exporter>) -> Self {
        let accumulators = exporters.iter().map(|e| e.begin()).collect();
        ExportSession {
            exporters,
            accumulators,
        }
    }

    pub fn exporters(&self) -> &[&'r dyn Exporter] {
        &self.exporters
    }

    /// Feed one scope to every exporter.
    pub fn accumulate(&mut self, request: &ExportRequest<'_>) {
        for (exporter, acc) in self.exporters.iter().zip(self.accumulators.iter_mut()) {
            exporter.accumulate(acc, request);
        }
    }

    /// Drop all accumulated state.
    pub fn reset(&mut self) {
        for (exporter, acc) in self.exporters.iter().zip(self.accumulators.iter_mut()) {
            *acc = exporter.begin();
        }
    }

    fn take(&mut self, index: usize) -> Accumulator {
        std::mem::replace(&mut self.accumulators[index], self.exporters[index].begin())
    }

    /// Finalize every exporter without writing.
    pub fn render(
        &mut self,
        options_for: impl Fn(&str) -> ExportOptions,
    ) -> Vec<(&'r str, Result<Rendered, ruleforge_exporters::ExportError>)> {
        (0..self.exporters.len())
            .map(|i| {
                let acc = self.take(i);
                let exporter = self.exporters[i];
                let name = exporter.name();
                (name, exporter.finalize(acc, &options_for(name)))
            })
            .collect()
    }

    /// Finalize and write every exporter, in order.
    pub fn finish(
        &mut self,
        options_for: impl Fn(&str) -> ExportOptions,
        writer: &mut AtomicWriter,
        write_options: WriteOptions,
    ) -> Result<Vec<ExportResult>, SyncError> {
        let mut results = Vec::with_capacity(self.exporters.len());
        for i in 0..self.exporters.len() {
            let acc = self.take(i);
            let exporter = self.exporters[i];
            let options = options_for(exporter.name());
            let rendered = exporter.finalize(acc, &options);
            results.push(complete(
                exporter.name(),
                rendered,
                &options,
                writer,
                write_options,
            )?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleforge_core::{Rule, Scope};
    use ruleforge_exporters::Registry;
    use tempfile::TempDir;

    fn rules() -> Vec<Rule> {
        vec![
            Rule::new("a", "Alpha", "Alpha body."),
            Rule::new("b", "Beta", "Beta body."),
        ]
    }

    #[test]
    fn content_hash_ignores_emit_order() {
        let a = RenderedFile {
            path: PathBuf::from("a.md"),
            content: "A".into(),
        };
        let b = RenderedFile {
            path: PathBuf::from("b.md"),
            content: "B".into(),
        };
        assert_eq!(
            content_hash(&[a.clone(), b.clone()]),
            content_hash(&[b.clone(), a.clone()])
        );
        let b2 = RenderedFile {
            content: "B2".into(),
            ..b
        };
        assert_ne!(content_hash(&[a.clone(), b2]), content_hash(&[a]));
    }

    #[test]
    fn second_export_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::builtin();
        let exporter = registry.get("cursor").unwrap();
        let rules = rules();
        let scope = Scope::root();
        let request = ExportRequest {
            scope: &scope,
            rules: &rules,
        };
        let options = ExportOptions::new(tmp.path());
        let mut writer = AtomicWriter::new();

        let first = export(exporter, &request, &options, &mut writer, WriteOptions::default()).unwrap();
        assert!(first.success);
        assert_eq!(first.files_written.len(), 2);

        let second = export(exporter, &request, &options, &mut writer, WriteOptions::default()).unwrap();
        assert!(second.files_written.is_empty());
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn dry_run_lists_without_writing() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::builtin();
        let rules = rules();
        let scope = Scope::root();
        let mut options = ExportOptions::new(tmp.path());
        options.dry_run = true;
        let mut writer = AtomicWriter::new();

        let result = export(
            registry.get("agents").unwrap(),
            &ExportRequest {
                scope: &scope,
                rules: &rules,
            },
            &options,
            &mut writer,
            WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(result.files_written, vec![PathBuf::from("AGENTS.md")]);
        assert!(!tmp.path().join("AGENTS.md").exists());
    }

    #[test]
    fn session_reset_drops_accumulated_rules() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::builtin();
        let mut session = ExportSession::new(registry.resolve(&["agents"]).unwrap());
        let scope = Scope::root();
        let rules = rules();
        session.accumulate(&ExportRequest {
            scope: &scope,
            rules: &rules,
        });
        session.reset();

        let one = vec![Rule::new("c", "Gamma", "Gamma body.")];
        session.accumulate(&ExportRequest {
            scope: &scope,
            rules: &one,
        });
        let rendered = session.render(|_| ExportOptions::new(tmp.path()));
        let (_, out) = &rendered[0];
        let content = &out.as_ref().unwrap().files[0].content;
        assert!(content.contains("Gamma"));
        assert!(!content.contains("Alpha"));
    }

    #[test]
    fn finish_leaves_fresh_state() {
        let tmp = TempDir::new().unwrap();
        let registry = Registry::builtin();
        let mut session = ExportSession::new(registry.resolve(&["claude"]).unwrap());
        let scope = Scope::root();
        let rules = rules();
        session.accumulate(&ExportRequest {
            scope: &scope,
            rules: &rules,
        });
        let mut writer = AtomicWriter::new();
        let results = session
            .finish(|_| ExportOptions::new(tmp.path()), &mut writer, WriteOptions::default())
            .unwrap();
        assert!(results[0].success);
        assert_eq!(results[0].files_written, vec![PathBuf::from("CLAUDE.md")]);

        let again = session.render(|_| ExportOptions::new(tmp.path()));
        let files = &again[0].1.as_ref().unwrap().files;
        assert!(files.iter().all(|f| !f.content.contains("Alpha body.")));
    }
}
