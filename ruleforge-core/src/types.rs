//! Domain types for canonical rules.
//!
//! The vendor bag is an insertion-ordered `serde_json::Map`; nothing here
//! assumes a fixed per-format schema. Hash stability does not depend on map
//! order because [`crate::canonical`] sorts keys itself.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scope::relative_path;
use crate::sections::slugify;

/// Version of the canonical document layout.
pub const SPEC_VERSION: &str = "1";

/// Placeholder stored in [`Integrity::value`] until a document is sealed.
pub const INTEGRITY_PLACEHOLDER: &str = "<computed>";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A stable, `/`-separated rule identifier (e.g. `testing/standards`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How strongly a rule should be enforced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

fn default_level() -> u8 {
    2
}

fn default_enabled() -> bool {
    true
}

fn is_default_level(level: &u8) -> bool {
    *level == default_level()
}

fn is_true(b: &bool) -> bool {
    *b
}

/// One titled guidance unit with machine-checkable attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub id: RuleId,
    pub heading: String,
    #[serde(default)]
    pub body: String,
    /// Heading depth (1–6) the rule had in its source.
    #[serde(default = "default_level", skip_serializing_if = "is_default_level")]
    pub level: u8,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub globs: Vec<String>,
    /// Project subtree the rule was imported from (`apps/docs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_location: Option<String>,
    #[serde(default = "default_enabled", skip_serializing_if = "is_true")]
    pub enabled: bool,
    /// Opaque machine-checkable block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Value>,
    /// Opaque autofix hint block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autofix: Option<Value>,
    /// Format-keyed metadata (`vendor.cursor.alwaysApply`, …).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vendor: Map<String, Value>,
    /// Dotted paths inside `vendor` excluded from hashing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volatile: Vec<String>,
    /// File the rule was read from. Never serialized or hashed.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Rule {
    /// A minimal enabled rule with default attributes.
    pub fn new(id: impl Into<RuleId>, heading: impl Into<String>, body: impl Into<String>) -> Self {
        Rule {
            id: id.into(),
            heading: heading.into(),
            body: body.into(),
            level: default_level(),
            severity: Severity::default(),
            globs: Vec::new(),
            nested_location: None,
            enabled: true,
            check: None,
            autofix: None,
            vendor: Map::new(),
            volatile: Vec::new(),
            source: None,
        }
    }

    /// Case-insensitive, trimmed heading used for conflict detection.
    pub fn heading_key(&self) -> String {
        self.heading.trim().to_lowercase()
    }

    /// File-name-safe slug of the rule id.
    pub fn slug(&self) -> String {
        slugify(&self.id.0.replace('/', "-"))
    }

    /// Vendor metadata for a single format, if present and an object.
    pub fn vendor_for(&self, format: &str) -> Option<&Map<String, Value>> {
        self.vendor.get(format).and_then(Value::as_object)
    }

    /// Attribute checks shared by rule-file parsing and overlays.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=6).contains(&self.level) {
            return Err(format!("level must be between 1 and 6, got {}", self.level));
        }
        if let Some(location) = &self.nested_location {
            relative_path(location).map_err(|reason| format!("nested_location '{location}' {reason}"))?;
        }
        Ok(())
    }

    /// `nested_location` with surrounding slashes removed; `None` when empty.
    pub fn location(&self) -> Option<&str> {
        self.nested_location
            .as_deref()
            .map(|l| l.trim_matches('/'))
            .filter(|l| !l.is_empty() && *l != ".")
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Pack metadata carried by every canonical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackMeta {
    pub id: String,
    pub version: String,
    pub spec_version: String,
}

impl PackMeta {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        PackMeta {
            id: id.into(),
            version: version.into(),
            spec_version: SPEC_VERSION.to_string(),
        }
    }
}

/// Integrity record. `value` is the document hash once sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub algo: String,
    pub value: String,
}

impl Default for Integrity {
    fn default() -> Self {
        Integrity {
            algo: "sha256".to_string(),
            value: INTEGRITY_PLACEHOLDER.to_string(),
        }
    }
}

/// The in-memory canonical document for one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pack: PackMeta,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub integrity: Integrity,
}

impl Document {
    pub fn new(pack: PackMeta, rules: Vec<Rule>) -> Self {
        Document {
            pack,
            rules,
            integrity: Integrity::default(),
        }
    }

    /// Rules that should be exported.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.enabled)
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// A project subtree with its own rule subset and export paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    /// Project-relative path; empty for the root scope.
    pub path: String,
    /// Rule id patterns (`web/*`, `*`, exact ids). `None` selects by
    /// `nested_location`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
}

impl Scope {
    pub const ROOT_NAME: &'static str = "root";

    pub fn root() -> Self {
        Scope {
            name: Self::ROOT_NAME.to_string(),
            path: String::new(),
            patterns: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newtype_display() {
        assert_eq!(RuleId::from("testing/standards").to_string(), "testing/standards");
        assert_eq!(Severity::Error.to_string(), "error");
    }

    #[test]
    fn rule_serde_skips_defaults() {
        let rule = Rule::new("a/b", "Heading", "body");
        let value = serde_json::to_value(&rule).expect("serialize");
        assert_eq!(
            value,
            json!({"id": "a/b", "heading": "Heading", "body": "body", "severity": "warn"})
        );
    }

    #[test]
    fn rule_rejects_unknown_top_level_field() {
        let err = serde_json::from_value::<Rule>(json!({
            "id": "x", "heading": "X", "colour": "blue"
        }))
        .expect_err("unknown field must be rejected");
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn location_normalizes_slashes() {
        let mut rule = Rule::new("x", "X", "");
        rule.nested_location = Some("/apps/docs/".to_string());
        assert_eq!(rule.location(), Some("apps/docs"));
        rule.nested_location = Some(".".to_string());
        assert_eq!(rule.location(), None);
    }

    #[test]
    fn slug_flattens_id_segments() {
        let rule = Rule::new("Testing/Unit Tests", "Unit", "");
        assert_eq!(rule.slug(), "testing-unit-tests");
    }

    #[test]
    fn document_roundtrip_yaml() {
        let doc = Document::new(PackMeta::new("p", "1.0.0"), vec![Rule::new("a", "A", "x")]);
        let yaml = serde_yaml::to_string(&doc).expect("serialize");
        let back: Document = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(doc, back);
        assert_eq!(back.integrity.value, INTEGRITY_PLACEHOLDER);
    }
}
