//! Canonical rule files.
//!
//! A rule file is markdown with an optional YAML front-matter block:
//!
//! ```text
//! ---
//! id: testing/standards
//! title: Testing Standards
//! severity: error
//! globs: ["**/*.rs"]
//! nested_location: apps/docs
//! vendor:
//!   cursor: { alwaysApply: true, session: abc }
//!   _meta: { volatile: [cursor.session] }
//! ---
//! Write tests for every public function.
//! ```
//!
//! A file with front-matter yields exactly one rule. A file without it is
//! split into one rule per top-level section.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical;
use crate::error::{io_err, CoreError};
use crate::scope::relative_path;
use crate::sections::{first_heading, slugify, split_sections};
use crate::types::{Rule, RuleId, Severity};

/// Vendor key holding ruleforge's own metadata (`_meta.volatile`).
pub const VENDOR_META_KEY: &str = "_meta";

/// Front-matter keys accepted in a rule file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontMatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub globs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autofix: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vendor: Map<String, Value>,
}

/// Rules parsed from one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSource {
    pub rules: Vec<Rule>,
    /// Content before the first heading of a sectioned file was dropped.
    pub preamble_ignored: bool,
}

// ---------------------------------------------------------------------------
// Front-matter split
// ---------------------------------------------------------------------------

/// Split `text` into `(front_matter_yaml, body)`; `None` when no block.
pub fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Default rule id for a file: its project-relative path without extension.
pub fn id_from_path(rel_path: &Path) -> RuleId {
    let without_ext = rel_path.with_extension("");
    let parts: Vec<String> = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|p| p != "." && !p.is_empty())
        .collect();
    RuleId(parts.join("/"))
}

/// Parse the text of a rule file that carries front-matter.
///
/// `path` is used for error messages and provenance; `rel_path` (relative
/// to the rules root) provides the default id.
pub fn parse_rule(text: &str, path: &Path, rel_path: &Path) -> Result<Rule, CoreError> {
    let (yaml, body) = split_front_matter(text).ok_or_else(|| CoreError::FrontMatter {
        path: path.to_path_buf(),
        message: "missing front-matter block".to_string(),
    })?;
    let front_matter = parse_front_matter(yaml, path)?;
    rule_from_parts(front_matter, body, path, rel_path)
}

fn parse_front_matter(yaml: &str, path: &Path) -> Result<FrontMatter, CoreError> {
    if yaml.trim().is_empty() {
        return Ok(FrontMatter::default());
    }
    let value = canonical::parse_yaml(yaml).map_err(|e| CoreError::FrontMatter {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| CoreError::FrontMatter {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn rule_from_parts(
    fm: FrontMatter,
    body: &str,
    path: &Path,
    rel_path: &Path,
) -> Result<Rule, CoreError> {
    let body = body.replace("\r\n", "\n");
    let mut body = body.trim_matches('\n').to_string();

    let heading = match fm.title {
        Some(title) => {
            body = strip_leading_heading(&body, Some(&title));
            title
        }
        None => match first_heading(&body) {
            Some((0, _, text)) => {
                body = strip_leading_heading(&body, None);
                text
            }
            _ => rel_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "untitled".to_string()),
        },
    };

    let (vendor, volatile) = lift_volatile(fm.vendor, path)?;

    let rule = Rule {
        id: fm.id.map(RuleId).unwrap_or_else(|| id_from_path(rel_path)),
        heading,
        body,
        level: fm.level.unwrap_or(2),
        severity: fm.severity.unwrap_or_default(),
        globs: fm.globs,
        nested_location: fm
            .nested_location
            .map(|l| relative_path(&l).unwrap_or(l))
            .filter(|l| !l.is_empty()),
        enabled: fm.enabled.unwrap_or(true),
        check: fm.check,
        autofix: fm.autofix,
        vendor,
        volatile,
        source: Some(path.to_path_buf()),
    };
    rule.validate().map_err(|message| CoreError::FrontMatter {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(rule)
}

/// Drop a leading `# heading` line when it repeats the title.
fn strip_leading_heading(body: &str, title: Option<&str>) -> String {
    let mut lines = body.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    match crate::sections::parse_heading(first) {
        Some((_, text)) if title.map_or(true, |t| t.trim() == text) => {
            lines.collect::<Vec<_>>().join("\n").trim_matches('\n').to_string()
        }
        _ => body.to_string(),
    }
}

/// Move `vendor._meta.volatile` into the sidecar list.
fn lift_volatile(
    mut vendor: Map<String, Value>,
    path: &Path,
) -> Result<(Map<String, Value>, Vec<String>), CoreError> {
    let Some(meta) = vendor.get_mut(VENDOR_META_KEY) else {
        return Ok((vendor, Vec::new()));
    };
    let invalid = || CoreError::FrontMatter {
        path: path.to_path_buf(),
        message: "vendor._meta.volatile must be a list of strings".to_string(),
    };
    let Some(meta_obj) = meta.as_object_mut() else {
        return Err(invalid());
    };
    let volatile = match meta_obj.shift_remove("volatile") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(invalid()),
    };
    if meta_obj.is_empty() {
        vendor.shift_remove(VENDOR_META_KEY);
    }
    Ok((vendor, volatile))
}

/// Parse any markdown source: one rule with front-matter, or one rule per
/// top-level section otherwise.
pub fn parse_source(text: &str, path: &Path, rel_path: &Path) -> Result<ParsedSource, CoreError> {
    if split_front_matter(text).is_some() {
        return Ok(ParsedSource {
            rules: vec![parse_rule(text, path, rel_path)?],
            preamble_ignored: false,
        });
    }

    let split = split_sections(text);
    let rules = split
        .sections
        .into_iter()
        .map(|section| {
            let mut rule = Rule::new(slugify(&section.heading), section.heading, section.body);
            rule.level = section.level;
            rule.source = Some(path.to_path_buf());
            rule
        })
        .collect();
    Ok(ParsedSource {
        rules,
        preamble_ignored: !split.preamble.is_empty(),
    })
}

/// Read and parse a source file from disk.
pub fn load_source(path: &Path, rel_path: &Path) -> Result<ParsedSource, CoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_source(&text, path, rel_path)
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Front-matter for `rule`, with the volatile sidecar written back under
/// `vendor._meta.volatile`.
pub fn front_matter_of(rule: &Rule) -> FrontMatter {
    let mut vendor = rule.vendor.clone();
    if !rule.volatile.is_empty() {
        let mut meta = vendor
            .shift_remove(VENDOR_META_KEY)
            .and_then(|v| match v {
                Value::Object(m) => Some(m),
                _ => None,
            })
            .unwrap_or_default();
        meta.insert(
            "volatile".to_string(),
            Value::Array(rule.volatile.iter().cloned().map(Value::String).collect()),
        );
        vendor.insert(VENDOR_META_KEY.to_string(), Value::Object(meta));
    }
    FrontMatter {
        id: Some(rule.id.0.clone()),
        title: Some(rule.heading.clone()),
        severity: Some(rule.severity),
        globs: rule.globs.clone(),
        nested_location: rule.nested_location.clone(),
        enabled: (!rule.enabled).then_some(false),
        level: (rule.level != 2).then_some(rule.level),
        check: rule.check.clone(),
        autofix: rule.autofix.clone(),
        vendor,
    }
}

/// Render `rule` as a canonical rule file.
pub fn render_rule(rule: &Rule) -> Result<String, CoreError> {
    let yaml = serde_yaml::to_string(&front_matter_of(rule))?;
    let mut out = format!("---\n{yaml}---\n");
    if !rule.body.is_empty() {
        out.push('\n');
        out.push_str(&rule.body);
        out.push('\n');
    }
    Ok(out)
}

/// Write `rule` to `path` atomically (`.tmp` sibling + rename).
pub fn save_rule(path: &Path, rule: &Rule) -> Result<(), CoreError> {
    let content = render_rule(rule)?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
