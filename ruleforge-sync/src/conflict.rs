//! Conflict detection across rule source files.
//!
//! Every configured source (file or directory) is scanned for `*.md`
//! files. Rules are keyed by heading (trimmed, case-insensitive). When more
//! than one file defines the same heading, the most recently modified file
//! wins; equal mtimes fall back to the lexicographically smallest path.
//! Input order never matters. Nothing here touches the files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use ruleforge_core::rule_file::load_source;
use ruleforge_core::Rule;

use crate::error::{io_err, SyncError};

/// One parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Project-relative path.
    pub path: PathBuf,
    pub modified: SystemTime,
    pub rules: Vec<Rule>,
}

/// Every source file found under the configured sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sources {
    pub files: Vec<SourceFile>,
    pub warnings: Vec<String>,
}

/// One file that defined a contested heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// A heading defined by more than one file, and which file won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub heading: String,
    /// Sorted by path.
    pub candidates: Vec<Candidate>,
    pub winner: PathBuf,
}

/// Result of merging all sources into one rule list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub rules: Vec<Rule>,
    pub conflicts: Vec<ConflictRecord>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}

/// Read and parse every `*.md` file under `sources` (project-relative).
///
/// Rule ids default to the file path relative to the configured source
/// directory. Missing sources are reported as warnings.
pub fn collect_sources(root: &Path, sources: &[PathBuf]) -> Result<Sources, SyncError> {
    let mut found: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut warnings = Vec::new();

    for source in sources {
        let base = root.join(source);
        if base.is_file() {
            let rel_id = PathBuf::from(base.file_name().unwrap_or_default());
            found.push((base, rel_id));
            continue;
        }
        if !base.is_dir() {
            warnings.push(format!("rule source not found: {}", source.display()));
            continue;
        }
        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                io_err(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() || !is_markdown(entry.path()) {
                continue;
            }
            let rel_id = entry
                .path()
                .strip_prefix(&base)
                .unwrap_or(entry.path())
                .to_path_buf();
            found.push((entry.path().to_path_buf(), rel_id));
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    found.dedup_by(|a, b| a.0 == b.0);

    let mut files = Vec::with_capacity(found.len());
    for (abs, rel_id) in found {
        let modified = std::fs::metadata(&abs)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(&abs, e))?;
        let parsed = load_source(&abs, &rel_id)?;
        let path = abs.strip_prefix(root).unwrap_or(&abs).to_path_buf();
        if parsed.preamble_ignored {
            warnings.push(format!(
                "{}: content before the first heading was ignored",
                path.display()
            ));
        }
        tracing::debug!("source: {} ({} rule(s))", path.display(), parsed.rules.len());
        files.push(SourceFile {
            path,
            modified,
            rules: parsed.rules,
        });
    }

    Ok(Sources { files, warnings })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

struct Slot {
    heading: String,
    /// (file index, rule index)
    candidates: Vec<(usize, usize)>,
}

/// `true` when `a` should win over `b`.
fn beats(a: &SourceFile, b: &SourceFile) -> bool {
    match a.modified.cmp(&b.modified) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => a.path < b.path,
    }
}

/// Merge the rules of `files`, resolving duplicate headings.
///
/// The merged list keeps each heading at its first occurrence in path
/// order, with the winning file's content. Two different headings that
/// end up with the same rule id are an input error.
pub fn resolve(files: &[SourceFile]) -> Result<Merged, SyncError> {
    let mut order: Vec<usize> = (0..files.len()).collect();
    order.sort_by(|&a, &b| files[a].path.cmp(&files[b].path));

    let mut slots: Vec<Slot> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut warnings = Vec::new();

    for &fi in &order {
        for (ri, rule) in files[fi].rules.iter().enumerate() {
            let key = rule.heading_key();
            match by_key.get(&key) {
                Some(&slot) if slots[slot].candidates.iter().any(|(f, _)| *f == fi) => {
                    warnings.push(format!(
                        "{}: heading '{}' appears more than once; keeping the first",
                        files[fi].path.display(),
                        rule.heading.trim()
                    ));
                }
                Some(&slot) => slots[slot].candidates.push((fi, ri)),
                None => {
                    by_key.insert(key, slots.len());
                    slots.push(Slot {
                        heading: rule.heading.trim().to_string(),
                        candidates: vec![(fi, ri)],
                    });
                }
            }
        }
    }

    let mut rules = Vec::with_capacity(slots.len());
    let mut conflicts = Vec::new();
    for slot in slots {
        let mut winner = slot.candidates[0];
        for &candidate in &slot.candidates[1..] {
            if beats(&files[candidate.0], &files[winner.0]) {
                winner = candidate;
            }
        }
        if slot.candidates.len() > 1 {
            let winner_path = files[winner.0].path.clone();
            tracing::info!(
                "conflict on '{}': {} wins",
                slot.heading,
                winner_path.display()
            );
            conflicts.push(ConflictRecord {
                heading: slot.heading,
                candidates: slot
                    .candidates
                    .iter()
                    .map(|&(f, _)| Candidate {
                        path: files[f].path.clone(),
                        modified: files[f].modified,
                    })
                    .collect(),
                winner: winner_path,
            });
        }
        rules.push(files[winner.0].rules[winner.1].clone());
    }

    let mut seen: HashMap<&str, &Rule> = HashMap::new();
    for rule in &rules {
        if let Some(first) = seen.insert(rule.id.0.as_str(), rule) {
            return Err(SyncError::Input(format!(
                "duplicate rule id '{}' (headings '{}' and '{}')",
                rule.id, first.heading, rule.heading
            )));
        }
    }

    Ok(Merged {
        rules,
        conflicts,
        warnings,
    })
}
