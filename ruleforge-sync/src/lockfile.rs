//! Lockfile and drift guard.
//!
//! The lockfile (`.ruleforge/lock.json`) records the bundle hash of the last
//! synced document. The allow-list (`.ruleforge/allow.yaml`) is the
//! human-curated set of approved bundle hashes; the guard reads it and never
//! writes it. Only [`approve`] appends to it, and only an explicit command
//! calls that.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ruleforge_core::canonical::{document_hash, prefixed, rule_hash};
use ruleforge_core::config::{allowlist_path_at, lockfile_path_at, LockMode};
use ruleforge_core::Document;

use crate::error::{io_err, json_err, yaml_err, SyncError};

pub const LOCKFILE_VERSION: u32 = 1;

/// Persisted record of the last synced bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub mode: LockMode,
    /// `sha256:<hex>` of the resolved document.
    pub bundle_hash: String,
    /// Rule id → `sha256:<hex>` of that rule.
    pub rules: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

/// One approved bundle hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowEntry {
    pub value: String,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    pub version: u32,
    #[serde(default)]
    pub approved: Vec<AllowEntry>,
}

impl Default for AllowList {
    fn default() -> Self {
        AllowList {
            version: LOCKFILE_VERSION,
            approved: Vec::new(),
        }
    }
}

impl AllowList {
    pub fn contains(&self, hash: &str) -> bool {
        self.approved.iter().any(|e| e.value == hash)
    }
}

/// Where the current bundle stands relative to the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    /// Lockfile mode is off.
    Solo,
    /// Bundle hash is approved.
    Current,
    /// Not approved; soft mode warns and proceeds.
    StaleSoft,
    /// Not approved; strict mode blocks the sync.
    StaleStrict,
    /// Not approved, bypassed with `--force`.
    Forced,
}

impl DriftStatus {
    pub fn blocks(self) -> bool {
        matches!(self, DriftStatus::StaleStrict)
    }
}

impl std::fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DriftStatus::Solo => "solo",
            DriftStatus::Current => "current",
            DriftStatus::StaleSoft => "stale (soft)",
            DriftStatus::StaleStrict => "stale (strict)",
            DriftStatus::Forced => "forced",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Build the lockfile payload for a fully resolved document.
pub fn bundle(doc: &Document, mode: LockMode) -> Result<Lockfile, SyncError> {
    let bundle_hash = prefixed(&document_hash(doc)?);
    let mut rules = BTreeMap::new();
    for rule in &doc.rules {
        rules.insert(rule.id.0.clone(), prefixed(&rule_hash(rule)?));
    }
    Ok(Lockfile {
        version: LOCKFILE_VERSION,
        mode,
        bundle_hash,
        rules,
        generated_at: Utc::now(),
    })
}

/// Classify `bundle_hash` against the allow-list.
pub fn check_drift(mode: LockMode, bundle_hash: &str, allow: &AllowList, force: bool) -> DriftStatus {
    match mode {
        LockMode::Off => DriftStatus::Solo,
        _ if allow.contains(bundle_hash) => DriftStatus::Current,
        _ if force => DriftStatus::Forced,
        LockMode::Soft => DriftStatus::StaleSoft,
        LockMode::Strict => DriftStatus::StaleStrict,
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

impl Lockfile {
    /// `None` when no lockfile exists yet.
    pub fn load_at(root: &Path) -> Result<Option<Lockfile>, SyncError> {
        let path = lockfile_path_at(root);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| json_err(&path, e))
    }

    pub fn save_at(&self, root: &Path) -> Result<(), SyncError> {
        let path = lockfile_path_at(root);
        let json = serde_json::to_string_pretty(self).map_err(|e| json_err(&path, e))?;
        write_atomic(&path, &json)
    }
}

impl AllowList {
    /// Empty list when the file does not exist.
    pub fn load_at(root: &Path) -> Result<AllowList, SyncError> {
        let path = allowlist_path_at(root);
        if !path.exists() {
            return Ok(AllowList::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| yaml_err(&path, e))
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), SyncError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

/// Append `hash` to the allow-list. Returns `false` when it was already
/// approved; existing entries are never rewritten.
pub fn approve(root: &Path, hash: &str, approved_by: &str) -> Result<bool, SyncError> {
    let mut allow = AllowList::load_at(root)?;
    if allow.contains(hash) {
        return Ok(false);
    }
    allow.approved.push(AllowEntry {
        value: hash.to_string(),
        approved_by: approved_by.to_string(),
        approved_at: Utc::now(),
    });
    let path = allowlist_path_at(root);
    let yaml = serde_yaml::to_string(&allow).map_err(|e| yaml_err(&path, e))?;
    write_atomic(&path, &yaml)?;
    tracing::info!("approved {hash} ({approved_by})");
    Ok(true)
}
