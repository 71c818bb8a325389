//! Stale export detection and cleanup.
//!
//! After an export run, a file is stale when either
//! 1. the checksum store records it as an export but no exporter produced it
//!    this run (its rule was deleted or disabled, or its exporter was
//!    removed from the config), or
//! 2. it sits in a multi-file exporter's output directory, carries the
//!    generated marker, and was not produced this run.
//!
//! Exporters that failed this run are skipped: their missing output says
//! nothing about staleness. Detection only reads; [`clean`] deletes.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use ruleforge_exporters::GENERATED_MARKER;

use crate::checksums::{store_key, ChecksumStore};
use crate::error::{io_err, SyncError};

/// Directories never scanned for generated files.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", ".ruleforge"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Recorded in the checksum store but not produced this run.
    NotProduced,
    /// Generated file in an export directory, produced by nobody.
    Untracked,
}

/// One stale export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleExport {
    /// Project-relative, `/`-separated.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exporter: Option<String>,
    pub reason: StaleReason,
    /// `false` when the recorded file is already gone.
    pub exists: bool,
}

/// Where a multi-file exporter writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub exporter: String,
    /// `/`-separated directory below the scope base (`.cursor/rules`).
    pub dir: String,
    pub ext: String,
}

/// Result of [`clean`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub deleted: Vec<String>,
    /// `(path, error)` pairs; never fatal.
    pub failures: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

fn in_target_dir(rel: &str, target: &ScanTarget) -> bool {
    let Some((parent, name)) = rel.rsplit_once('/') else {
        return false;
    };
    let dir_ok = parent == target.dir || parent.ends_with(&format!("/{}", target.dir));
    dir_ok && name.ends_with(&format!(".{}", target.ext))
}

fn is_generated(path: &Path) -> Result<bool, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text.contains(GENERATED_MARKER)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == ErrorKind::InvalidData => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Find stale exports under `root`.
///
/// `produced` holds store keys of every file emitted this run; `failed`
/// names exporters whose output must not be judged.
pub fn find_stale(
    root: &Path,
    store: &ChecksumStore,
    produced: &BTreeSet<String>,
    targets: &[ScanTarget],
    failed: &BTreeSet<String>,
) -> Result<Vec<StaleExport>, SyncError> {
    let mut stale = Vec::new();

    for (key, record) in store.exports() {
        if produced.contains(key) {
            continue;
        }
        let skip = match &record.exporter {
            Some(name) => failed.contains(name),
            None => !failed.is_empty(),
        };
        if skip {
            continue;
        }
        stale.push(StaleExport {
            path: key.clone(),
            exporter: record.exporter.clone(),
            reason: StaleReason::NotProduced,
            exists: root.join(key).exists(),
        });
    }

    let targets: Vec<&ScanTarget> = targets
        .iter()
        .filter(|t| !failed.contains(&t.exporter))
        .collect();
    if !targets.is_empty() {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !SKIP_DIRS.iter().any(|d| e.file_name() == *d)
            });
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                io_err(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let key = store_key(root, entry.path());
            if produced.contains(&key) || stale.iter().any(|s| s.path == key) {
                continue;
            }
            let Some(target) = targets.iter().find(|t| in_target_dir(&key, t)) else {
                continue;
            };
            if is_generated(entry.path())? {
                stale.push(StaleExport {
                    path: key,
                    exporter: Some(target.exporter.clone()),
                    reason: StaleReason::Untracked,
                    exists: true,
                });
            }
        }
    }

    stale.sort_by(|a, b| a.path.cmp(&b.path));
    stale.dedup_by(|a, b| a.path == b.path);
    if !stale.is_empty() {
        let paths: Vec<PathBuf> = stale.iter().map(|s| PathBuf::from(&s.path)).collect();
        tracing::warn!("{} stale export(s): {}", stale.len(), preview_files(&paths));
    }
    Ok(stale)
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Delete `stale` files and drop their checksum records. Failures are
/// collected, not raised.
pub fn clean(root: &Path, stale: &[StaleExport], store: &mut ChecksumStore) -> CleanReport {
    let mut report = CleanReport::default();
    for item in stale {
        let path = root.join(&item.path);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("removed stale export: {}", path.display());
                store.remove(&item.path);
                report.deleted.push(item.path.clone());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                store.remove(&item.path);
            }
            Err(e) => {
                tracing::warn!("could not remove {}: {e}", path.display());
                report.failures.push((item.path.clone(), e.to_string()));
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

/// Format age from a chrono timestamp (checksum store `synced_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

/// First three paths, then `+N more`.
pub fn preview_files(paths: &[PathBuf]) -> String {
    let mut shown: Vec<String> = paths
        .iter()
        .take(3)
        .map(|p| p.display().to_string())
        .collect();
    if paths.len() > shown.len() {
        shown.push(format!("+{} more", paths.len() - shown.len()));
    }
    shown.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cursor() -> ScanTarget {
        ScanTarget {
            exporter: "cursor".into(),
            dir: ".cursor/rules".into(),
            ext: "mdc".into(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn put(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn recorded_but_not_produced_is_stale() {
        let tmp = TempDir::new().unwrap();
        put(tmp.path(), ".cursor/rules/old.mdc", "x");
        let mut store = ChecksumStore::default();
        store.record_export(".cursor/rules/old.mdc", "h", "cursor");
        store.record_export(".cursor/rules/new.mdc", "h", "cursor");
        store.record_source(".ruleforge/rules/a.md", "h");

        let stale = find_stale(tmp.path(), &store, &set(&[".cursor/rules/new.mdc"]), &[], &set(&[])).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].path, ".cursor/rules/old.mdc");
        assert_eq!(stale[0].reason, StaleReason::NotProduced);
        assert!(stale[0].exists);
    }

    #[test]
    fn failed_exporter_is_not_judged() {
        let tmp = TempDir::new().unwrap();
        let mut store = ChecksumStore::default();
        store.record_export("AGENTS.md", "h", "agents");
        let stale = find_stale(tmp.path(), &store, &set(&[]), &[], &set(&["agents"])).unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn untracked_generated_file_is_stale_but_hand_written_is_not() {
        let tmp = TempDir::new().unwrap();
        let marker = format!("<!-- {GENERATED_MARKER} id=x -->\n");
        put(tmp.path(), "apps/web/.cursor/rules/orphan.mdc", &marker);
        put(tmp.path(), ".cursor/rules/mine.mdc", "hand written");
        put(tmp.path(), ".cursor/rules/current.mdc", &marker);
        put(tmp.path(), "node_modules/pkg/.cursor/rules/dep.mdc", &marker);

        let stale = find_stale(
            tmp.path(),
            &ChecksumStore::default(),
            &set(&[".cursor/rules/current.mdc"]),
            &[cursor()],
            &set(&[]),
        )
        .unwrap();
        let paths: Vec<_> = stale.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, ["apps/web/.cursor/rules/orphan.mdc"]);
        assert_eq!(stale[0].reason, StaleReason::Untracked);
    }

    #[test]
    fn clean_deletes_and_drops_records() {
        let tmp = TempDir::new().unwrap();
        put(tmp.path(), "OLD.md", "x");
        let mut store = ChecksumStore::default();
        store.record_export("OLD.md", "h", "agents");
        store.record_export("GONE.md", "h", "agents");

        let stale = find_stale(tmp.path(), &store, &set(&[]), &[], &set(&[])).unwrap();
        assert_eq!(stale.len(), 2);
        let report = clean(tmp.path(), &stale, &mut store);
        assert_eq!(report.deleted, vec!["OLD.md".to_string()]);
        assert!(report.failures.is_empty());
        assert!(store.files.is_empty());
        assert!(!tmp.path().join("OLD.md").exists());
    }

    #[test]
    fn ages_are_compact() {
        assert_eq!(format_seconds(59), "59s");
        assert_eq!(format_seconds(60 * 5), "5m");
        assert_eq!(format_seconds(60 * 60 * 3), "3h");
        assert_eq!(format_seconds(60 * 60 * 24 * 2), "2d");
        let age = format_datetime_age(Utc::now() - chrono::Duration::seconds(120));
        assert_eq!(age, "2m");
        assert!(format_datetime_age(Utc::now()).ends_with('s'));
    }

    #[test]
    fn preview_truncates() {
        let paths: Vec<PathBuf> = ["a", "b", "c", "d", "e"].iter().map(PathBuf::from).collect();
        assert_eq!(preview_files(&paths), "a, b, c, +2 more");
    }
}
