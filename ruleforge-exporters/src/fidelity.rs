//! Fidelity accounting.
//!
//! Exporters record every canonical attribute they cannot represent. Notes
//! are grouped per feature, so a hundred rules with `check` blocks produce
//! one note listing a hundred ids rather than a hundred notes.

use std::collections::{BTreeMap, BTreeSet};

use ruleforge_core::{Rule, Severity};

/// A canonical feature a format may fail to represent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Feature {
    /// Machine-checkable `check` block.
    Check,
    /// `autofix` hint block.
    Autofix,
    /// Non-default severity.
    Severity,
    /// Path globs in a format without native globs.
    Globs,
    /// Another format's vendor bag, carried inert in the output.
    VendorCarried(String),
    /// Another format's vendor bag, not written at all.
    VendorDropped(String),
    /// Rule body referenced by path rather than embedded.
    BodyReferenced,
}

impl Feature {
    fn describe(&self, format: &str) -> String {
        match self {
            Feature::Check => {
                format!("machine-checkable `check` blocks have no {format} equivalent")
            }
            Feature::Autofix => format!("`autofix` hints have no {format} equivalent"),
            Feature::Severity => format!("non-default severity is not represented in {format}"),
            Feature::Globs => format!("path globs are not supported by {format}"),
            Feature::VendorCarried(vendor) => {
                format!("vendor metadata for '{vendor}' carried inert in {format} output")
            }
            Feature::VendorDropped(vendor) => {
                format!("vendor metadata for '{vendor}' cannot be represented in {format}")
            }
            Feature::BodyReferenced => {
                format!("rule bodies are referenced by file, not embedded, in {format}")
            }
        }
    }
}

/// What a format can carry natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Support {
    pub check: bool,
    pub autofix: bool,
    pub severity: bool,
    pub globs: bool,
    /// Foreign vendor bags are written (inert) rather than dropped.
    pub carries_vendor: bool,
    /// Rule bodies are embedded in the output.
    pub embeds_body: bool,
}

/// Deduplicating collector of fidelity notes for one exporter run.
#[derive(Debug, Clone, Default)]
pub struct FidelityLog {
    format: String,
    entries: BTreeMap<Feature, BTreeSet<String>>,
}

impl FidelityLog {
    pub fn new(format: impl Into<String>) -> Self {
        FidelityLog {
            format: format.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn note(&mut self, feature: Feature, rule_id: &str) {
        self.entries
            .entry(feature)
            .or_default()
            .insert(rule_id.to_string());
    }

    /// Record every gap between `rule` and `support`. `own_vendor` names the
    /// vendor key this format consumes itself.
    pub fn scan(&mut self, rule: &Rule, support: Support, own_vendor: &str) {
        let id = rule.id.0.as_str();
        if rule.check.is_some() && !support.check {
            self.note(Feature::Check, id);
        }
        if rule.autofix.is_some() && !support.autofix {
            self.note(Feature::Autofix, id);
        }
        if rule.severity != Severity::default() && !support.severity {
            self.note(Feature::Severity, id);
        }
        if !rule.globs.is_empty() && !support.globs {
            self.note(Feature::Globs, id);
        }
        if !support.embeds_body {
            self.note(Feature::BodyReferenced, id);
        }
        for vendor in rule.vendor.keys().filter(|k| k.as_str() != own_vendor) {
            let feature = if support.carries_vendor {
                Feature::VendorCarried(vendor.clone())
            } else {
                Feature::VendorDropped(vendor.clone())
            };
            self.note(feature, id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable notes, one per feature, in a stable order.
    pub fn into_notes(self) -> Vec<String> {
        let format = self.format;
        self.entries
            .into_iter()
            .map(|(feature, ids)| {
                let ids: Vec<String> = ids.into_iter().collect();
                format!("{} (rules: {})", feature.describe(&format), ids.join(", "))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notes_are_grouped_per_feature() {
        let mut a = Rule::new("a", "A", "");
        a.check = Some(json!({"pattern": "x"}));
        let mut b = Rule::new("b", "B", "");
        b.check = Some(json!({"pattern": "y"}));

        let mut log = FidelityLog::new("AGENTS.md");
        log.scan(&a, Support { embeds_body: true, ..Support::default() }, "agents");
        log.scan(&b, Support { embeds_body: true, ..Support::default() }, "agents");
        log.scan(&a, Support { embeds_body: true, ..Support::default() }, "agents");

        let notes = log.into_notes();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("check"));
        assert!(notes[0].ends_with("(rules: a, b)"), "{}", notes[0]);
    }

    #[test]
    fn own_vendor_is_not_reported() {
        let mut rule = Rule::new("r", "R", "");
        rule.vendor.insert("cursor".into(), json!({"alwaysApply": true}));
        rule.vendor.insert("windsurf".into(), json!({"trigger": "manual"}));

        let mut log = FidelityLog::new("cursor");
        let support = Support {
            globs: true,
            carries_vendor: true,
            embeds_body: true,
            ..Support::default()
        };
        log.scan(&rule, support, "cursor");
        let notes = log.into_notes();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("'windsurf' carried inert"));
    }

    #[test]
    fn full_support_yields_nothing() {
        let mut rule = Rule::new("r", "R", "");
        rule.severity = Severity::Error;
        rule.globs = vec!["*.rs".into()];
        let support = Support {
            check: true,
            autofix: true,
            severity: true,
            globs: true,
            carries_vendor: true,
            embeds_body: true,
        };
        let mut log = FidelityLog::new("x");
        log.scan(&rule, support, "x");
        assert!(log.is_empty());
    }
}
