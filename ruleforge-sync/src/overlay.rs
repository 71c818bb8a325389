//! Overlays: selector-addressed set/remove patches.
//!
//! Overlays apply in declared order; each sees the output of the previous
//! one. A patch is applied to the JSON form of a rule and the result is
//! validated by deserializing it back into a [`Rule`] and running the same
//! checks as rule-file parsing. A selector matching nothing is an error.

use serde::Serialize;
use serde_json::Value;

use ruleforge_core::config::OverlaySpec;
use ruleforge_core::dotted;
use ruleforge_core::selector::Selector;
use ruleforge_core::{Document, Rule};

/// A problem with one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayError {
    /// Position in the configured overlay list.
    pub index: usize,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub message: String,
}

impl std::fmt::Display for OverlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "overlay #{} ({})", self.index, self.selector)?;
        if let Some(id) = &self.rule_id {
            write!(f, " on rule '{id}'")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Result of [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayOutcome {
    pub success: bool,
    pub document: Document,
    /// Overlays that changed at least one rule.
    pub applied_count: usize,
    pub errors: Vec<OverlayError>,
}

/// One property an overlay changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayChange {
    pub rule_id: String,
    pub key: String,
    /// `None` when the key was absent.
    pub before: Option<Value>,
    /// `None` when the key was removed.
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayDiff {
    pub index: usize,
    pub selector: String,
    pub changes: Vec<OverlayChange>,
}

/// Per-overlay changes for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayReport {
    pub overlays: Vec<OverlayDiff>,
    /// Properties whose value actually changed.
    pub changed: usize,
    pub errors: Vec<OverlayError>,
}

// ---------------------------------------------------------------------------
// Rule view
// ---------------------------------------------------------------------------

/// JSON form of `rule` with defaulted attributes filled in, so selectors
/// like `rule[enabled=true]` see them.
pub fn rule_view(rule: &Rule) -> Result<Value, String> {
    let mut value = serde_json::to_value(rule).map_err(|e| e.to_string())?;
    if let Some(object) = value.as_object_mut() {
        object
            .entry("level")
            .or_insert_with(|| Value::from(rule.level));
        object
            .entry("enabled")
            .or_insert_with(|| Value::Bool(rule.enabled));
    }
    Ok(value)
}

fn from_view(view: Value, original: &Rule) -> Result<Rule, String> {
    let mut rule: Rule = serde_json::from_value(view).map_err(|e| e.to_string())?;
    rule.validate()?;
    rule.source = original.source.clone();
    Ok(rule)
}

/// Apply one overlay to one rule view, returning the attempted changes.
fn patch(view: &mut Value, overlay: &OverlaySpec, rule_id: &str) -> Result<Vec<OverlayChange>, String> {
    let mut changes = Vec::new();
    for (key, new) in &overlay.set {
        if key == "id" {
            return Err("the rule id cannot be changed by an overlay".to_string());
        }
        let before = dotted::get(view, key).cloned();
        dotted::set(view, key, new.clone())?;
        changes.push(OverlayChange {
            rule_id: rule_id.to_string(),
            key: key.clone(),
            before,
            after: Some(new.clone()),
        });
    }
    for key in &overlay.remove {
        if key == "id" || key == "heading" {
            return Err(format!("'{key}' cannot be removed"));
        }
        let before = dotted::remove(view, key);
        changes.push(OverlayChange {
            rule_id: rule_id.to_string(),
            key: key.clone(),
            before,
            after: None,
        });
    }
    Ok(changes)
}

/// Walk every overlay over `rules`, calling `on_change` with each
/// overlay's effective changes.
fn run(
    rules: &mut [Rule],
    overlays: &[OverlaySpec],
    mut on_overlay: impl FnMut(usize, &OverlaySpec, Vec<OverlayChange>),
) -> Vec<OverlayError> {
    let mut errors = Vec::new();
    for (index, overlay) in overlays.iter().enumerate() {
        let error = |rule_id: Option<&str>, message: String| OverlayError {
            index,
            selector: overlay.selector.clone(),
            rule_id: rule_id.map(String::from),
            message,
        };
        let selector = match Selector::parse(&overlay.selector) {
            Ok(s) => s,
            Err(e) => {
                errors.push(error(None, e.to_string()));
                continue;
            }
        };

        let mut matched = 0;
        let mut changes = Vec::new();
        for rule in rules.iter_mut() {
            let id = rule.id.0.clone();
            let mut view = match rule_view(rule) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(error(Some(&id), e));
                    continue;
                }
            };
            if !selector.matches(&view) {
                continue;
            }
            matched += 1;
            let patched = patch(&mut view, overlay, &id).and_then(|c| Ok((c, from_view(view, rule)?)));
            match patched {
                Ok((c, updated)) => {
                    *rule = updated;
                    changes.extend(c);
                }
                Err(message) => errors.push(error(Some(&id), message)),
            }
        }

        if matched == 0 {
            errors.push(error(None, "selector matched no rules".to_string()));
            continue;
        }
        on_overlay(index, overlay, changes);
    }
    errors
}

/// Apply `overlays` to a copy of `doc`.
pub fn apply(doc: &Document, overlays: &[OverlaySpec]) -> OverlayOutcome {
    let mut document = doc.clone();
    let mut applied_count = 0;
    let errors = run(&mut document.rules, overlays, |_, _, changes| {
        if !changes.is_empty() {
            applied_count += 1;
        }
    });
    for e in &errors {
        tracing::warn!("{e}");
    }
    OverlayOutcome {
        success: errors.is_empty(),
        document,
        applied_count,
        errors,
    }
}

/// Describe what each overlay would change, without exporting anything.
pub fn diff_overlays(doc: &Document, overlays: &[OverlaySpec]) -> OverlayReport {
    let mut rules = doc.rules.clone();
    let mut diffs = Vec::new();
    let errors = run(&mut rules, overlays, |index, overlay, changes| {
        diffs.push(OverlayDiff {
            index,
            selector: overlay.selector.clone(),
            changes,
        });
    });
    let changed = diffs
        .iter()
        .flat_map(|d| &d.changes)
        .filter(|c| c.before != c.after)
        .count();
    OverlayReport {
        overlays: diffs,
        changed,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleforge_core::{PackMeta, Severity};
    use serde_json::{json, Map};

    fn doc() -> Document {
        let mut b = Rule::new("t/b", "B", "");
        b.vendor.insert("cursor".into(), json!({"alwaysApply": false}));
        Document::new(PackMeta::new("p", "1"), vec![Rule::new("t/r", "R", "body"), b])
    }

    fn overlay(selector: &str, set: Value, remove: &[&str]) -> OverlaySpec {
        let set: Map<String, Value> = match set {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        OverlaySpec {
            selector: selector.to_string(),
            set,
            remove: remove.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn severity_overlay_applies_once() {
        let overlays = [overlay("rule[id=t/r]", json!({"severity": "error"}), &[])];
        let out = apply(&doc(), &overlays);
        assert!(out.success, "{:?}", out.errors);
        assert_eq!(out.applied_count, 1);
        assert_eq!(out.document.rules[0].severity, Severity::Error);
        assert_eq!(out.document.rules[1].severity, Severity::Warn);

        let report = diff_overlays(&doc(), &overlays);
        assert_eq!(report.changed, 1);
        let change = &report.overlays[0].changes[0];
        assert_eq!(change.rule_id, "t/r");
        assert_eq!(change.key, "severity");
        assert_eq!(change.before, Some(json!("warn")));
        assert_eq!(change.after, Some(json!("error")));
    }

    #[test]
    fn zero_match_is_an_error() {
        let out = apply(&doc(), &[overlay("rule[id=nope]", json!({"enabled": false}), &[])]);
        assert!(!out.success);
        assert_eq!(out.applied_count, 0);
        assert!(out.errors[0].message.contains("matched no rules"));
    }

    #[test]
    fn dotted_set_and_remove() {
        let overlays = [
            overlay("rule[id=t/r]", json!({"check.inputs.threshold": 3}), &[]),
            overlay("rule[vendor.cursor.alwaysApply=false]", json!({}), &["vendor.cursor.alwaysApply"]),
        ];
        let out = apply(&doc(), &overlays);
        assert!(out.success, "{:?}", out.errors);
        assert_eq!(out.document.rules[0].check, Some(json!({"inputs": {"threshold": 3}})));
        assert_eq!(out.document.rules[1].vendor["cursor"], json!({}));
    }

    #[test]
    fn overlays_see_prior_output() {
        let overlays = [
            overlay("rule[id=t/r]", json!({"severity": "error"}), &[]),
            overlay("rule[severity=error]", json!({"globs": ["**/*.rs"]}), &[]),
        ];
        let out = apply(&doc(), &overlays);
        assert!(out.success);
        assert_eq!(out.applied_count, 2);
        assert_eq!(out.document.rules[0].globs, vec!["**/*.rs"]);
    }

    #[test]
    fn invalid_result_leaves_rule_unchanged() {
        let out = apply(&doc(), &[overlay("rule[id=t/r]", json!({"severity": "loud"}), &[])]);
        assert!(!out.success);
        assert_eq!(out.errors[0].rule_id.as_deref(), Some("t/r"));
        assert_eq!(out.document.rules[0], doc().rules[0]);
    }

    #[test]
    fn patched_rule_is_revalidated() {
        let deep = apply(&doc(), &[overlay("rule[id=t/r]", json!({"level": 9}), &[])]);
        assert!(!deep.success);
        assert!(deep.errors[0].message.contains("level must be between 1 and 6"));
        assert_eq!(deep.document.rules[0].level, 2);

        let escaped = apply(&doc(), &[overlay("rule[id=t/r]", json!({"nested_location": "../out"}), &[])]);
        assert!(!escaped.success);
        assert!(escaped.errors[0].message.contains("escapes the project root"));
        assert_eq!(escaped.document.rules[0].nested_location, None);
    }

    #[test]
    fn bad_selector_names_the_selector() {
        let out = apply(&doc(), &[overlay("rules(id)", json!({}), &[])]);
        assert!(!out.success);
        assert!(out.errors[0].to_string().contains("rules(id)"));
    }

    #[test]
    fn id_is_immutable() {
        let out = apply(&doc(), &[overlay("rule[id=t/r]", json!({"id": "x"}), &[])]);
        assert!(!out.success);
    }

    #[test]
    fn enabled_default_is_selectable() {
        let out = apply(&doc(), &[overlay("rule[enabled=true]", json!({"enabled": false}), &[])]);
        assert!(out.success);
        assert!(out.document.rules.iter().all(|r| !r.enabled));
    }
}
