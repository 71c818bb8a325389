//! `ruleforge check` — read-only project health report.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use ruleforge_sync::staleness::{format_datetime_age, preview_files};
use ruleforge_sync::{check, CheckReport, DriftStatus, SyncOptions};

use super::load_context;

/// Arguments for `ruleforge check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CheckJson<'a> {
    clean: bool,
    bundle_hash: &'a str,
    drift: DriftStatus,
    locked_hash: Option<&'a str>,
    last_sync_at: Option<String>,
    pending: Vec<String>,
    modified: &'a [String],
    missing: &'a [String],
    stale: Vec<&'a str>,
    conflicts: Vec<&'a str>,
    warnings: &'a [String],
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "check")]
    check: &'static str,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl CheckArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let ctx = load_context(root, SyncOptions::default())?;
        let report = check(&ctx).context("check failed")?;

        if self.json {
            print_json(&report)?;
        } else {
            print_table(&report);
        }
        if !report.is_clean() {
            bail!("project is out of sync");
        }
        Ok(())
    }
}

fn print_json(report: &CheckReport) -> Result<()> {
    let payload = CheckJson {
        clean: report.is_clean(),
        bundle_hash: &report.bundle_hash,
        drift: report.drift,
        locked_hash: report.locked_hash.as_deref(),
        last_sync_at: report.synced_at.map(|t| t.to_rfc3339()),
        pending: report
            .pending
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        modified: &report.modified,
        missing: &report.missing,
        stale: report.stale.iter().map(|s| s.path.as_str()).collect(),
        conflicts: report.conflicts.iter().map(|c| c.heading.as_str()).collect(),
        warnings: &report.warnings,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize check JSON")?
    );
    Ok(())
}

fn ok_or(flag: bool, bad: &str) -> String {
    if flag {
        "ok".green().to_string()
    } else {
        bad.yellow().to_string()
    }
}

fn print_table(report: &CheckReport) {
    let last_sync = report
        .synced_at
        .map(format_datetime_age)
        .map(|age| format!("{age} ago"))
        .unwrap_or_else(|| "never".to_string());
    println!(
        "ruleforge v{} | bundle {} | last sync {}",
        env!("CARGO_PKG_VERSION"),
        report.bundle_hash,
        last_sync
    );

    let drift_ok = matches!(report.drift, DriftStatus::Solo | DriftStatus::Current);
    let lock_detail = match &report.locked_hash {
        Some(hash) if *hash == report.bundle_hash => "lockfile matches".to_string(),
        Some(hash) => format!("lockfile has {hash}"),
        None => "no lockfile".to_string(),
    };
    let paths = |items: &[String]| {
        let paths: Vec<std::path::PathBuf> = items.iter().map(Into::into).collect();
        preview_files(&paths)
    };
    let stale: Vec<String> = report.stale.iter().map(|s| s.path.clone()).collect();

    let rows = vec![
        CheckRow {
            check: "drift",
            status: ok_or(drift_ok, &report.drift.to_string()),
            detail: lock_detail,
        },
        CheckRow {
            check: "pending",
            status: ok_or(report.pending.is_empty(), &report.pending.len().to_string()),
            detail: preview_files(&report.pending),
        },
        CheckRow {
            check: "modified",
            status: ok_or(report.modified.is_empty(), &report.modified.len().to_string()),
            detail: paths(&report.modified),
        },
        CheckRow {
            check: "missing",
            status: ok_or(report.missing.is_empty(), &report.missing.len().to_string()),
            detail: paths(&report.missing),
        },
        CheckRow {
            check: "stale",
            status: ok_or(stale.is_empty(), &stale.len().to_string()),
            detail: paths(&stale),
        },
        CheckRow {
            check: "conflicts",
            status: report.conflicts.len().to_string(),
            detail: report
                .conflicts
                .iter()
                .map(|c| format!("{} → {}", c.heading, c.winner.display()))
                .collect::<Vec<_>>()
                .join(", "),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for (exporter, error) in &report.failures {
        println!("{} {exporter}: {error}", "✗".red());
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }
    if !report.is_clean() {
        println!("Run 'ruleforge sync' to update exports.");
    }
}
