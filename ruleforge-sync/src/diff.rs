//! Unified diffs of what `sync` would write, for `ruleforge diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use crate::error::{io_err, SyncError};
use crate::pipeline::{render_all, SyncContext};

/// A single rendered file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub exporter: String,
    /// Project-relative.
    pub path: PathBuf,
    pub unified_diff: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    pub diffs: Vec<FileDiff>,
    /// `(exporter, error)` for exporters that failed to render.
    pub failures: Vec<(String, String)>,
}

/// Render every enabled exporter and compare against on-disk content.
///
/// No files are written.
pub fn diff(ctx: &SyncContext) -> Result<DiffReport, SyncError> {
    let run = render_all(ctx)?;
    let mut report = DiffReport::default();

    for (exporter, result) in run.rendered {
        let rendered = match result {
            Ok(r) => r,
            Err(e) => {
                report.failures.push((exporter, e.to_string()));
                continue;
            }
        };
        for file in rendered.files {
            let existing = read_existing_or_empty(&ctx.root.join(&file.path))?;
            if existing == file.content {
                continue;
            }

            let old_header = format!("a/{}", file.path.display());
            let new_header = format!("b/{}", file.path.display());
            let unified = TextDiff::from_lines(&existing, &file.content)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string();

            report.diffs.push(FileDiff {
                exporter: exporter.clone(),
                path: file.path,
                unified_diff: unified,
            });
        }
    }

    Ok(report)
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(normalize_line_endings(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
