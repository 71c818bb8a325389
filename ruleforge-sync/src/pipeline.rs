//! The sync pipeline shared by every CLI command.
//!
//! ```text
//! sources ─▶ conflict::resolve ─▶ overlay::apply ─▶ seal
//!         ─▶ drift guard ─▶ ExportSession (all scopes) ─▶ AtomicWriter group
//!         ─▶ stale exports ─▶ checksum store + lockfile
//! ```
//!
//! Input errors (bad front-matter, bad selector, unknown exporter, overlay
//! matching nothing) fail before anything is written. One exporter failing
//! does not stop the others but marks the run unsuccessful.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ruleforge_core::canonical::seal;
use ruleforge_core::config::{checksum_store_path_at, Config};
use ruleforge_core::scope::partition;
use ruleforge_core::{Document, Scope};
use ruleforge_exporters::{ExportError, ExportOptions, ExportRequest, Exporter, Registry, Rendered};

use crate::checksums::{store_key, ChecksumStore};
use crate::conflict::{self, ConflictRecord};
use crate::error::SyncError;
use crate::export::{ExportResult, ExportSession};
use crate::lockfile::{self, AllowList, DriftStatus, Lockfile};
use crate::overlay;
use crate::staleness::{self, CleanReport, ScanTarget, StaleExport};
use crate::writer::{hash_file, AtomicWriter, ChecksumHandler, WriteOptions};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Flags for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Bypass the drift guard and overwrite manual edits.
    pub force: bool,
    /// Delete stale exports (also enabled by `stale.clean` in config).
    pub clean: bool,
    pub interactive: bool,
}

/// Everything a pipeline run needs; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub root: PathBuf,
    pub config: Config,
    pub options: SyncOptions,
}

impl SyncContext {
    pub fn new(root: impl Into<PathBuf>, config: Config, options: SyncOptions) -> Self {
        SyncContext {
            root: root.into(),
            config,
            options,
        }
    }

    /// Load `.ruleforge/config.yaml` under `root`.
    pub fn load(root: &Path, options: SyncOptions) -> Result<Self, SyncError> {
        let config = Config::load_at(root)?;
        Ok(SyncContext::new(root, config, options))
    }

    fn export_options(&self, exporter: &str, dry_run: bool) -> ExportOptions {
        let mut options =
            ExportOptions::new(&self.root).with_knobs(self.config.exporter_knobs(exporter));
        options.dry_run = dry_run;
        options
    }

    fn exporters<'r>(&self, registry: &'r Registry) -> Result<Vec<&'r dyn Exporter>, SyncError> {
        registry
            .resolve(&self.config.exporters)
            .map_err(|e| SyncError::Input(e.to_string()))
    }
}

/// One consequential pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    pub detail: String,
}

fn audit(trail: &mut Vec<AuditEntry>, action: &str, detail: impl Into<String>) {
    let detail = detail.into();
    tracing::debug!("{action}: {detail}");
    trail.push(AuditEntry {
        at: Utc::now(),
        action: action.to_string(),
        detail,
    });
}

// ---------------------------------------------------------------------------
// Document resolution
// ---------------------------------------------------------------------------

/// The sealed document for a run, with what it took to build it.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub document: Document,
    pub conflicts: Vec<ConflictRecord>,
    pub warnings: Vec<String>,
    /// Source files read, project-relative.
    pub sources: Vec<PathBuf>,
    pub overlays_applied: usize,
}

/// Merge sources, resolve conflicts, apply overlays and seal.
pub fn resolve_document(ctx: &SyncContext) -> Result<ResolvedDocument, SyncError> {
    let collected = conflict::collect_sources(&ctx.root, &ctx.config.sources)?;
    let merged = conflict::resolve(&collected.files)?;

    let mut warnings = collected.warnings;
    warnings.extend(merged.warnings);

    let document = Document::new(ctx.config.pack_meta(), merged.rules);
    let outcome = overlay::apply(&document, &ctx.config.overlays);
    if !outcome.success {
        let messages: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        return Err(SyncError::Input(messages.join("; ")));
    }

    let mut document = outcome.document;
    seal(&mut document)?;
    Ok(ResolvedDocument {
        document,
        conflicts: merged.conflicts,
        warnings,
        sources: collected.files.into_iter().map(|f| f.path).collect(),
        overlays_applied: outcome.applied_count,
    })
}

fn accumulate_scopes(session: &mut ExportSession<'_>, doc: &Document, scopes: &[Scope]) {
    for (scope, rules) in partition(doc.enabled_rules(), scopes) {
        session.accumulate(&ExportRequest {
            scope: &scope,
            rules: &rules,
        });
    }
}

fn scan_targets(registry: &Registry, names: &[String]) -> Vec<ScanTarget> {
    names
        .iter()
        .filter_map(|name| registry.rule_dir(name))
        .map(|exporter| ScanTarget {
            exporter: exporter.dialect().name.to_string(),
            dir: exporter.dialect().dir.to_string(),
            ext: exporter.dialect().ext.to_string(),
        })
        .collect()
}

fn produced_keys<'a>(root: &Path, paths: impl IntoIterator<Item = &'a PathBuf>) -> BTreeSet<String> {
    paths
        .into_iter()
        .map(|p| store_key(root, &root.join(p)))
        .collect()
}

// ---------------------------------------------------------------------------
// Rendering without writing
// ---------------------------------------------------------------------------

/// Everything every enabled exporter would emit, in config order.
pub struct RenderRun {
    pub resolved: ResolvedDocument,
    pub rendered: Vec<(String, Result<Rendered, ExportError>)>,
}

pub fn render_all(ctx: &SyncContext) -> Result<RenderRun, SyncError> {
    let registry = Registry::builtin();
    let exporters = ctx.exporters(&registry)?;
    let scopes = ctx.config.resolved_scopes()?;
    let resolved = resolve_document(ctx)?;

    let mut session = ExportSession::new(exporters);
    accumulate_scopes(&mut session, &resolved.document, &scopes);
    let rendered = session
        .render(|name| ctx.export_options(name, true))
        .into_iter()
        .map(|(name, result)| (name.to_string(), result))
        .collect();
    Ok(RenderRun { resolved, rendered })
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// What a sync run did.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub success: bool,
    pub dry_run: bool,
    /// Project-relative paths written (or that would be, in a dry run).
    pub written_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub conflicts: Vec<ConflictRecord>,
    pub audit_trail: Vec<AuditEntry>,
    pub exporters: Vec<ExportResult>,
    pub stale: Vec<StaleExport>,
    pub cleaned: Option<CleanReport>,
    pub drift: DriftStatus,
    pub bundle_hash: String,
}

/// Run the full pipeline.
///
/// `handler` decides about manually edited outputs; without one, a manual
/// edit fails that exporter unless `force` is set. If the handler aborts,
/// every file written in this run is restored.
pub fn sync(
    ctx: &SyncContext,
    handler: Option<Box<dyn ChecksumHandler>>,
) -> Result<SyncOutcome, SyncError> {
    let opts = ctx.options;
    let mut trail = Vec::new();

    let registry = Registry::builtin();
    let exporters = ctx.exporters(&registry)?;
    let scopes = ctx.config.resolved_scopes()?;
    let resolved = resolve_document(ctx)?;
    audit(
        &mut trail,
        "sources merged",
        format!(
            "{} file(s), {} rule(s), {} conflict(s)",
            resolved.sources.len(),
            resolved.document.rules.len(),
            resolved.conflicts.len()
        ),
    );
    if !ctx.config.overlays.is_empty() {
        audit(
            &mut trail,
            "overlay applied",
            format!("{} of {} overlay(s)", resolved.overlays_applied, ctx.config.overlays.len()),
        );
    }
    let mut warnings = resolved.warnings.clone();

    // Drift guard.
    let mode = ctx.config.lockfile.mode;
    let lock = lockfile::bundle(&resolved.document, mode)?;
    let drift = if mode.is_team() {
        let allow = AllowList::load_at(&ctx.root)?;
        lockfile::check_drift(mode, &lock.bundle_hash, &allow, opts.force)
    } else {
        DriftStatus::Solo
    };
    audit(&mut trail, "lockfile checked", format!("{drift} ({})", lock.bundle_hash));

    let mut outcome = SyncOutcome {
        success: true,
        dry_run: opts.dry_run,
        written_files: Vec::new(),
        warnings: Vec::new(),
        conflicts: resolved.conflicts.clone(),
        audit_trail: Vec::new(),
        exporters: Vec::new(),
        stale: Vec::new(),
        cleaned: None,
        drift,
        bundle_hash: lock.bundle_hash.clone(),
    };

    match drift {
        DriftStatus::StaleStrict => {
            let message = format!(
                "bundle {} is not approved; run `ruleforge approve` or re-run with --force",
                lock.bundle_hash
            );
            tracing::warn!("{message}");
            warnings.push(message);
            outcome.success = false;
            outcome.warnings = warnings;
            outcome.audit_trail = trail;
            return Ok(outcome);
        }
        DriftStatus::StaleSoft => {
            let message = format!("bundle {} is not approved", lock.bundle_hash);
            tracing::warn!("{message}");
            warnings.push(message);
        }
        DriftStatus::Forced => {
            tracing::warn!("drift guard bypassed for {}", lock.bundle_hash);
        }
        DriftStatus::Solo | DriftStatus::Current => {}
    }

    // Export.
    let mut store = ChecksumStore::load_at(&ctx.root)?;
    let mut writer = AtomicWriter::new();
    if let Some(handler) = handler {
        writer = writer.with_handler(handler);
    }
    for (path, hash) in store.export_hashes(&ctx.root) {
        writer.seed(path, hash);
    }
    if !opts.dry_run {
        writer.begin_group();
    }

    let mut session = ExportSession::new(exporters);
    accumulate_scopes(&mut session, &resolved.document, &scopes);
    let write_options = WriteOptions {
        interactive: opts.interactive,
        force: opts.force,
    };
    let results = match session.finish(
        |name| ctx.export_options(name, opts.dry_run),
        &mut writer,
        write_options,
    ) {
        Ok(results) => results,
        Err(e) => {
            let restored = writer.rollback()?;
            tracing::warn!("rolled back {restored} file(s)");
            return Err(e);
        }
    };
    writer.commit();

    for result in &results {
        let detail = match &result.error {
            Some(error) => format!("{}: failed: {error}", result.exporter),
            None => format!("{}: {} file(s) written", result.exporter, result.files_written.len()),
        };
        audit(&mut trail, "exporter finished", detail);
        outcome.success &= result.success;
        outcome.written_files.extend(result.files_written.iter().cloned());
        warnings.extend(result.warnings.iter().map(|w| format!("{}: {w}", result.exporter)));
        if !opts.dry_run {
            let kept: BTreeSet<&PathBuf> = result.kept.iter().collect();
            for rel in result.produced.iter().filter(|p| !kept.contains(p)) {
                let abs = ctx.root.join(rel);
                if let Some(hash) = writer.checksum(&abs) {
                    store.record_export(store_key(&ctx.root, &abs), hash, &result.exporter);
                }
            }
        }
    }

    // Stale exports.
    let produced = produced_keys(&ctx.root, results.iter().flat_map(|r| &r.produced));
    let failed: BTreeSet<String> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.exporter.clone())
        .collect();
    let targets = scan_targets(&registry, &ctx.config.exporters);
    outcome.stale = staleness::find_stale(&ctx.root, &store, &produced, &targets, &failed)?;
    if !outcome.stale.is_empty() {
        if (opts.clean || ctx.config.stale.clean) && !opts.dry_run {
            let report = staleness::clean(&ctx.root, &outcome.stale, &mut store);
            for path in &report.deleted {
                audit(&mut trail, "stale export removed", path.clone());
            }
            for (path, error) in &report.failures {
                warnings.push(format!("could not remove stale export {path}: {error}"));
            }
            outcome.cleaned = Some(report);
        } else {
            for item in &outcome.stale {
                warnings.push(format!("stale export: {}", item.path));
            }
        }
    }
    outcome.exporters = results;

    // Persist.
    if !opts.dry_run {
        for source in &resolved.sources {
            let abs = ctx.root.join(source);
            if let Some(hash) = hash_file(&abs)? {
                store.record_source(store_key(&ctx.root, &abs), hash);
            }
        }
        store.synced_at = Utc::now();
        store.save_at(&ctx.root)?;
        if mode.is_team() && outcome.success {
            lock.save_at(&ctx.root)?;
            audit(&mut trail, "lockfile written", lock.bundle_hash.clone());
        }
    }

    outcome.warnings = warnings;
    outcome.audit_trail = trail;
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

/// Read-only health report for `ruleforge check`.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub bundle_hash: String,
    pub drift: DriftStatus,
    /// Bundle hash recorded by the last team-mode sync.
    pub locked_hash: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    /// Exports whose on-disk content differs from what was written.
    pub modified: Vec<String>,
    /// Recorded exports missing from disk.
    pub missing: Vec<String>,
    /// Files a sync would write.
    pub pending: Vec<PathBuf>,
    pub stale: Vec<StaleExport>,
    pub conflicts: Vec<ConflictRecord>,
    pub failures: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        !self.drift.blocks()
            && !matches!(self.drift, DriftStatus::StaleSoft)
            && self.modified.is_empty()
            && self.missing.is_empty()
            && self.pending.is_empty()
            && self.stale.is_empty()
            && self.failures.is_empty()
    }
}

/// Compare the project against what a sync would produce. Writes nothing.
pub fn check(ctx: &SyncContext) -> Result<CheckReport, SyncError> {
    let run = render_all(ctx)?;
    let mode = ctx.config.lockfile.mode;
    let lock = lockfile::bundle(&run.resolved.document, mode)?;
    let drift = if mode.is_team() {
        let allow = AllowList::load_at(&ctx.root)?;
        lockfile::check_drift(mode, &lock.bundle_hash, &allow, false)
    } else {
        DriftStatus::Solo
    };
    let locked_hash = Lockfile::load_at(&ctx.root)?.map(|l| l.bundle_hash);

    let store_exists = checksum_store_path_at(&ctx.root).exists();
    let store = ChecksumStore::load_at(&ctx.root)?;

    let mut modified = Vec::new();
    let mut missing = Vec::new();
    for (key, record) in store.exports() {
        match hash_file(&ctx.root.join(key))? {
            Some(hash) if hash != record.hash => modified.push(key.clone()),
            Some(_) => {}
            None => missing.push(key.clone()),
        }
    }

    let mut pending = Vec::new();
    let mut produced = BTreeSet::new();
    let mut failures = Vec::new();
    for (name, result) in &run.rendered {
        match result {
            Ok(rendered) => {
                for file in &rendered.files {
                    let abs = ctx.root.join(&file.path);
                    produced.insert(store_key(&ctx.root, &abs));
                    let current = std::fs::read_to_string(&abs)
                        .ok()
                        .map(|t| t.replace("\r\n", "\n"));
                    if current.as_deref() != Some(file.content.as_str()) {
                        pending.push(file.path.clone());
                    }
                }
            }
            Err(e) => failures.push((name.clone(), e.to_string())),
        }
    }
    let failed: BTreeSet<String> = failures.iter().map(|(n, _)| n.clone()).collect();
    let registry = Registry::builtin();
    let targets = scan_targets(&registry, &ctx.config.exporters);
    let stale = staleness::find_stale(&ctx.root, &store, &produced, &targets, &failed)?;

    Ok(CheckReport {
        bundle_hash: lock.bundle_hash,
        drift,
        locked_hash,
        synced_at: store_exists.then_some(store.synced_at),
        modified,
        missing,
        pending,
        stale,
        conflicts: run.resolved.conflicts,
        failures,
        warnings: run.resolved.warnings,
    })
}
