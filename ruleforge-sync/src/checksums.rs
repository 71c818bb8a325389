//! Checksum store: persisted hashes of every file ruleforge wrote or read.
//!
//! Persists a [`ChecksumStore`] JSON document at `.ruleforge/checksums.json`,
//! keyed by project-relative `/`-separated paths. Writes use the `.tmp` +
//! rename pattern. The older flat `{path: hash}` shape is still accepted on
//! load, as is a structured store whose records are bare hash strings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ruleforge_core::config::checksum_store_path_at;

use crate::error::{io_err, json_err, SyncError};

/// What a recorded file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[default]
    Export,
    Source,
}

/// Last known hash of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub hash: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub kind: RecordKind,
    /// Exporter that produced the file (`kind: export` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<String>,
}

/// On-disk checksum store payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumStore {
    pub synced_at: DateTime<Utc>,
    pub files: BTreeMap<String, ChecksumRecord>,
}

impl Default for ChecksumStore {
    fn default() -> Self {
        ChecksumStore {
            synced_at: Utc::now(),
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoreCompat {
    Structured(StructuredCompat),
    Legacy(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct StructuredCompat {
    synced_at: Option<DateTime<Utc>>,
    files: BTreeMap<String, RecordCompat>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordCompat {
    Full(ChecksumRecord),
    Bare(String),
}

impl RecordCompat {
    fn into_record(self, now: DateTime<Utc>) -> ChecksumRecord {
        match self {
            RecordCompat::Full(record) => record,
            RecordCompat::Bare(hash) => ChecksumRecord {
                hash,
                recorded_at: now,
                kind: RecordKind::Export,
                exporter: None,
            },
        }
    }
}

/// `/`-separated store key for `path` relative to `root`.
pub fn store_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl ChecksumStore {
    /// Load the store under `root`; empty when the file does not exist yet.
    pub fn load_at(root: &Path) -> Result<ChecksumStore, SyncError> {
        let path = checksum_store_path_at(root);
        if !path.exists() {
            return Ok(ChecksumStore::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let now = Utc::now();
        let compat: StoreCompat =
            serde_json::from_str(&contents).map_err(|e| json_err(&path, e))?;
        Ok(match compat {
            StoreCompat::Structured(store) => ChecksumStore {
                synced_at: store.synced_at.unwrap_or(now),
                files: store
                    .files
                    .into_iter()
                    .map(|(k, v)| (k, v.into_record(now)))
                    .collect(),
            },
            StoreCompat::Legacy(files) => ChecksumStore {
                synced_at: now,
                files: files
                    .into_iter()
                    .map(|(k, hash)| (k, RecordCompat::Bare(hash).into_record(now)))
                    .collect(),
            },
        })
    }

    /// Save atomically: `checksums.json.tmp` then rename.
    pub fn save_at(&self, root: &Path) -> Result<(), SyncError> {
        let path = checksum_store_path_at(root);
        let Some(dir) = path.parent() else {
            return Err(io_err(
                path,
                std::io::Error::other("invalid checksum store path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let json = serde_json::to_string_pretty(self).map_err(|e| json_err(&path, e))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn record_export(&mut self, key: impl Into<String>, hash: impl Into<String>, exporter: &str) {
        self.files.insert(
            key.into(),
            ChecksumRecord {
                hash: hash.into(),
                recorded_at: Utc::now(),
                kind: RecordKind::Export,
                exporter: Some(exporter.to_string()),
            },
        );
    }

    pub fn record_source(&mut self, key: impl Into<String>, hash: impl Into<String>) {
        self.files.insert(
            key.into(),
            ChecksumRecord {
                hash: hash.into(),
                recorded_at: Utc::now(),
                kind: RecordKind::Source,
                exporter: None,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<ChecksumRecord> {
        self.files.remove(key)
    }

    /// Export records, in key order.
    pub fn exports(&self) -> impl Iterator<Item = (&String, &ChecksumRecord)> {
        self.files
            .iter()
            .filter(|(_, r)| r.kind == RecordKind::Export)
    }

    /// Absolute paths and hashes of export records, for seeding a writer.
    pub fn export_hashes(&self, root: &Path) -> Vec<(PathBuf, String)> {
        self.exports()
            .map(|(key, record)| (root.join(key), record.hash.clone()))
            .collect()
    }
}
