//! `ruleforge exporters` — list the built-in exporters.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use ruleforge_exporters::Registry;

/// Arguments for `ruleforge exporters`.
#[derive(Args, Debug)]
pub struct ExportersArgs {
    /// Emit exporter manifests as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ExporterRow {
    #[tabled(rename = "name")]
    name: &'static str,
    #[tabled(rename = "shape")]
    shape: &'static str,
    #[tabled(rename = "output")]
    output: String,
    #[tabled(rename = "description")]
    description: &'static str,
}

impl ExportersArgs {
    pub fn run(self) -> Result<()> {
        let registry = Registry::builtin();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&registry.manifests())
                    .context("failed to serialize manifests")?
            );
            return Ok(());
        }

        let rows: Vec<ExporterRow> = registry
            .iter()
            .map(|e| {
                let d = e.descriptor();
                ExporterRow {
                    name: d.name,
                    shape: if d.capabilities.multi_file {
                        "multi-file"
                    } else {
                        "single-file"
                    },
                    output: d.output_path_globs.first().cloned().unwrap_or_default(),
                    description: d.description,
                }
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
