//! Template contexts — serializable rendering payloads built from rules.

use serde::Serialize;

use ruleforge_core::Rule;

use crate::error::ExportError;

/// Marker embedded in every multi-file export.
pub const GENERATED_MARKER: &str = "ruleforge:generated";

/// Banner preceding every centrally-managed section of a merged file.
pub const MANAGED_MARKER: &str = "ruleforge:managed";

/// Closes a managed section. Everything between the banner and this line
/// belongs to the rule, headings included.
pub const MANAGED_END_MARKER: &str = "/ruleforge:managed";

/// Banner at the top of every merged file.
pub const MANAGED_FILE_MARKER: &str = "ruleforge:managed-file";

/// Payload for one rule in a rule-directory export.
#[derive(Debug, Clone, Serialize)]
pub struct RuleFileContext {
    /// Rendered YAML mapping, newline-terminated.
    pub front_matter: String,
    pub marker: String,
    pub hashes: String,
    pub heading: String,
    pub body: String,
}

impl RuleFileContext {
    pub fn new(rule: &Rule, front_matter: String) -> Self {
        RuleFileContext {
            front_matter,
            marker: generated_marker(rule),
            hashes: hashes(rule.level),
            heading: rule.heading.clone(),
            body: rule.body.clone(),
        }
    }
}

/// Payload for one managed section of a merged markdown file.
#[derive(Debug, Clone, Serialize)]
pub struct SectionContext {
    pub banner: String,
    pub end_banner: String,
    pub hashes: String,
    pub heading: String,
    pub body: String,
}

impl SectionContext {
    /// `heading` may differ from the rule heading when scope-prefixed.
    pub fn new(rule: &Rule, heading: String) -> Self {
        SectionContext {
            banner: format!("{MANAGED_MARKER} id={}", rule.id),
            end_banner: MANAGED_END_MARKER.to_string(),
            hashes: hashes(rule.level),
            heading,
            body: rule.body.clone(),
        }
    }
}

/// Payload for a whole merged markdown file.
#[derive(Debug, Clone, Serialize)]
pub struct MergedFileContext {
    pub file_banner: String,
    /// Already-rendered managed sections, each newline-terminated.
    pub sections: Vec<String>,
    /// Verbatim user content kept from the previous file.
    pub preserved: String,
}

impl MergedFileContext {
    pub fn new(sections: Vec<String>, preserved: String) -> Self {
        MergedFileContext {
            file_banner: format!(
                "{MANAGED_FILE_MARKER}: sections marked {MANAGED_MARKER} are regenerated from .ruleforge/rules"
            ),
            sections,
            preserved,
        }
    }
}

/// `ruleforge:generated id=<id>; edit .ruleforge/rules instead`
pub fn generated_marker(rule: &Rule) -> String {
    format!("{GENERATED_MARKER} id={}; edit .ruleforge/rules instead", rule.id)
}

/// Extract the rule id from a generated or managed marker line.
pub fn marker_id(line: &str) -> Option<&str> {
    let inner = line
        .trim()
        .strip_prefix("<!--")?
        .strip_suffix("-->")?
        .trim();
    let rest = inner
        .strip_prefix(GENERATED_MARKER)
        .or_else(|| inner.strip_prefix(MANAGED_MARKER))?;
    let id = rest.trim_start().strip_prefix("id=")?;
    let id = id.split(';').next().unwrap_or(id).trim();
    (!id.is_empty()).then_some(id)
}

fn hashes(level: u8) -> String {
    "#".repeat(usize::from(level.clamp(1, 6)))
}

/// True for the line closing a managed section.
pub fn is_managed_end(line: &str) -> bool {
    line.trim()
        .strip_prefix("<!--")
        .and_then(|l| l.strip_suffix("-->"))
        .is_some_and(|inner| inner.trim() == MANAGED_END_MARKER)
}

/// Convert any context to a [`tera::Context`] for rendering.
pub fn to_tera_context<T: Serialize>(ctx: &T) -> Result<tera::Context, ExportError> {
    tera::Context::from_serialize(ctx).map_err(ExportError::from)
}
