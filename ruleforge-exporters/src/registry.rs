//! Compile-time exporter registry, keyed by name.

use crate::error::ExportError;
use crate::exporter::{Exporter, ExporterManifest};
use crate::formats::{
    ConfigMergeExporter, MergedMarkdownExporter, RuleDirExporter, CONFIG_TARGETS, DIALECTS,
    MERGED_TARGETS,
};

/// Every built-in exporter. Names are unique.
pub struct Registry {
    exporters: Vec<Box<dyn Exporter>>,
}

impl Registry {
    pub fn builtin() -> Self {
        let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();
        for dialect in DIALECTS {
            exporters.push(Box::new(RuleDirExporter::new(*dialect)));
        }
        for target in MERGED_TARGETS {
            exporters.push(Box::new(MergedMarkdownExporter::new(*target)));
        }
        for target in CONFIG_TARGETS {
            exporters.push(Box::new(ConfigMergeExporter::new(*target)));
        }
        Registry { exporters }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Exporter> {
        self.exporters
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    /// Look up every name, failing on the first unknown one.
    pub fn resolve<'a, S: AsRef<str>>(&'a self, names: &[S]) -> Result<Vec<&'a dyn Exporter>, ExportError> {
        names
            .iter()
            .map(|n| {
                self.get(n.as_ref())
                    .ok_or_else(|| ExportError::Unknown(n.as_ref().to_string()))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.exporters.iter().map(|e| e.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Exporter> {
        self.exporters.iter().map(|e| e.as_ref())
    }

    pub fn manifests(&self) -> Vec<ExporterManifest> {
        self.exporters
            .iter()
            .map(|e| e.descriptor().manifest())
            .collect()
    }

    /// The rule-directory exporter named `name`, for re-import.
    pub fn rule_dir(&self, name: &str) -> Option<RuleDirExporter> {
        DIALECTS
            .iter()
            .find(|d| d.name == name)
            .map(|d| RuleDirExporter::new(*d))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}
