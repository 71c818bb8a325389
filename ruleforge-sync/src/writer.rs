//! Atomic writer with manual-edit protection and rollback.
//!
//! ## `write` protocol
//!
//! 1. Normalise line endings to LF and hash the content.
//! 2. Ensure the parent directory exists.
//! 3. If the path is tracked and its on-disk hash differs from the tracked
//!    hash, the file was edited externally: `force` proceeds, otherwise the
//!    [`ChecksumHandler`] decides, and without a handler the write fails.
//! 4. Back up existing content to `.<name>.ruleforge.bak` (skipped when the
//!    file does not exist yet).
//! 5. Write `.<name>.ruleforge.tmp` in the same directory.
//! 6. Rename onto the target. This is the only visible mutation.
//! 7. Record the new hash; drop the backup unless a write group is open.
//!
//! Temp and backup files are removed on every error path.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ruleforge_core::canonical::hash_bytes;

use crate::error::{io_err, RollbackFailure, SyncError};

// ---------------------------------------------------------------------------
// Options, handler, outcome
// ---------------------------------------------------------------------------

/// Per-write policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// A human is available to answer prompts.
    pub interactive: bool,
    /// Overwrite manual edits without asking.
    pub force: bool,
}

/// Details of a detected manual edit, passed to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualEdit {
    pub path: PathBuf,
    pub last_hash: String,
    pub current_hash: String,
    pub interactive: bool,
    pub force: bool,
}

/// What to do about a manual edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Overwrite,
    Keep,
    Abort,
}

/// Pluggable manual-edit policy.
pub trait ChecksumHandler {
    fn resolve(&mut self, edit: &ManualEdit) -> Resolution;
}

impl<F> ChecksumHandler for F
where
    F: FnMut(&ManualEdit) -> Resolution,
{
    fn resolve(&mut self, edit: &ManualEdit) -> Resolution {
        self(edit)
    }
}

/// Outcome of an individual write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// File now holds the new content.
    Written { path: PathBuf },
    /// Handler chose to keep the manually edited file.
    Kept { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Sidecar paths
// ---------------------------------------------------------------------------

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.ruleforge.{suffix}"))
}

/// `.<name>.ruleforge.tmp` next to `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    sidecar(path, "tmp")
}

/// `.<name>.ruleforge.bak` next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    sidecar(path, "bak")
}

/// Removes a sidecar file on drop unless disarmed.
struct Cleanup {
    path: Option<PathBuf>,
}

impl Cleanup {
    fn new(path: PathBuf) -> Self {
        Cleanup { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// LF-normalised SHA-256 of a file's content.
pub fn hash_file(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).replace("\r\n", "\n");
            Ok(Some(hash_bytes(text.as_bytes())))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

// ---------------------------------------------------------------------------
// AtomicWriter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct WriteGroup {
    /// (target, backup, checksum before the write)
    backups: Vec<(PathBuf, PathBuf, Option<String>)>,
    /// Files that did not exist before the group wrote them.
    created: Vec<(PathBuf, Option<String>)>,
}

/// One writer per sync invocation. Holds the checksum map and any open
/// write group; never shared between runs.
#[derive(Default)]
pub struct AtomicWriter {
    checksums: HashMap<PathBuf, String>,
    handler: Option<Box<dyn ChecksumHandler>>,
    group: Option<WriteGroup>,
}

impl AtomicWriter {
    pub fn new() -> Self {
        AtomicWriter::default()
    }

    pub fn with_handler(mut self, handler: Box<dyn ChecksumHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Record the current on-disk hash of `path` (no-op when absent).
    pub fn track(&mut self, path: &Path) -> Result<(), SyncError> {
        if let Some(hash) = hash_file(path)? {
            self.checksums.insert(path.to_path_buf(), hash);
        }
        Ok(())
    }

    /// Record a known hash for `path`, e.g. from the persisted store.
    pub fn seed(&mut self, path: impl Into<PathBuf>, hash: impl Into<String>) {
        self.checksums.insert(path.into(), hash.into());
    }

    pub fn checksum(&self, path: &Path) -> Option<&str> {
        self.checksums.get(path).map(String::as_str)
    }

    pub fn checksums(&self) -> &HashMap<PathBuf, String> {
        &self.checksums
    }

    /// Atomically replace `path` with `content`.
    pub fn write(
        &mut self,
        path: &Path,
        content: &str,
        options: WriteOptions,
    ) -> Result<WriteOutcome, SyncError> {
        let normalized = content.replace("\r\n", "\n");
        let digest = hash_bytes(normalized.as_bytes());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let on_disk = hash_file(path)?;
        let previous = self.checksums.get(path).cloned();
        if let (Some(last), Some(current)) = (&previous, &on_disk) {
            if last != current && !options.force {
                let edit = ManualEdit {
                    path: path.to_path_buf(),
                    last_hash: last.clone(),
                    current_hash: current.clone(),
                    interactive: options.interactive,
                    force: options.force,
                };
                let Some(handler) = self.handler.as_mut() else {
                    return Err(SyncError::ManualEdit {
                        path: path.to_path_buf(),
                        expected: last.clone(),
                        actual: current.clone(),
                    });
                };
                match handler.resolve(&edit) {
                    Resolution::Overwrite => {
                        tracing::warn!("overwriting manual edit: {}", path.display());
                    }
                    Resolution::Keep => {
                        tracing::warn!("keeping manual edit: {}", path.display());
                        self.checksums.insert(path.to_path_buf(), current.clone());
                        return Ok(WriteOutcome::Kept {
                            path: path.to_path_buf(),
                        });
                    }
                    Resolution::Abort => {
                        return Err(SyncError::Aborted {
                            path: path.to_path_buf(),
                        })
                    }
                }
            }
        }

        // Lazy backup of existing content.
        let backup = backup_path(path);
        let mut backup_guard = None;
        if on_disk.is_some() {
            std::fs::copy(path, &backup).map_err(|e| io_err(&backup, e))?;
            backup_guard = Some(Cleanup::new(backup.clone()));
        }

        let tmp = temp_path(path);
        let _tmp_guard = Cleanup::new(tmp.clone());
        std::fs::write(&tmp, normalized.as_bytes()).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;

        self.checksums.insert(path.to_path_buf(), digest);
        if let Some(group) = self.group.as_mut() {
            if let Some(guard) = backup_guard.as_mut() {
                guard.disarm();
                group.backups.push((path.to_path_buf(), backup, previous));
            } else {
                group.created.push((path.to_path_buf(), previous));
            }
        }

        tracing::info!("wrote: {}", path.display());
        Ok(WriteOutcome::Written {
            path: path.to_path_buf(),
        })
    }

    // -----------------------------------------------------------------------
    // Write groups
    // -----------------------------------------------------------------------

    /// Start retaining backups so the following writes can be rolled back.
    pub fn begin_group(&mut self) {
        if self.group.is_none() {
            self.group = Some(WriteGroup::default());
        }
    }

    pub fn in_group(&self) -> bool {
        self.group.is_some()
    }

    /// Keep every write of the open group and drop its backups.
    pub fn commit(&mut self) {
        if let Some(group) = self.group.take() {
            for (_, backup, _) in group.backups {
                let _ = std::fs::remove_file(backup);
            }
        }
    }

    /// Undo every write of the open group.
    ///
    /// Backups are restored newest first; missing backups are skipped.
    /// Files the group created are removed. All failures are reported
    /// together.
    pub fn rollback(&mut self) -> Result<usize, SyncError> {
        let Some(group) = self.group.take() else {
            return Ok(0);
        };
        let mut failures = Vec::new();
        let mut restored = 0;

        for (path, backup, previous) in group.backups.into_iter().rev() {
            if !backup.exists() {
                continue;
            }
            match std::fs::rename(&backup, &path) {
                Ok(()) => {
                    restored += 1;
                    self.restore_checksum(&path, previous);
                }
                Err(e) => failures.push(RollbackFailure {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            }
        }
        for (path, previous) in group.created.into_iter().rev() {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    restored += 1;
                    self.restore_checksum(&path, previous);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => failures.push(RollbackFailure {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            Ok(restored)
        } else {
            Err(SyncError::Rollback { failures })
        }
    }

    fn restore_checksum(&mut self, path: &Path, previous: Option<String>) {
        match previous {
            Some(hash) => {
                self.checksums.insert(path.to_path_buf(), hash);
            }
            None => {
                self.checksums.remove(path);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
