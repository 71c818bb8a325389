//! Merged markdown formats: every scope's rules in one file.
//!
//! # Path mapping
//!
//! | Exporter    | Output path                          |
//! |-------------|--------------------------------------|
//! | `agents`    | `AGENTS.md`                          |
//! | `claude`    | `CLAUDE.md`                          |
//! | `gemini`    | `GEMINI.md`                          |
//! | `copilot`   | `.github/copilot-instructions.md`    |
//! | `aider-md`  | `CONVENTIONS.md`                     |
//! | `warp`      | `WARP.md`                            |
//! | `junie`     | `.junie/guidelines.md`               |
//! | `qwen`      | `QWEN.md`                            |
//! | `crush`     | `CRUSH.md`                           |
//! | `openhands` | `.openhands/microagents/repo.md`     |
//! | `goose`     | `.goosehints`                        |
//! | `zed`       | `.rules`                             |
//!
//! On finalize the existing file is read back. Sections preceded by a
//! managed banner are regenerated; any other section whose heading is not
//! a canonical heading is kept verbatim after the managed ones.

use std::collections::HashSet;
use std::path::PathBuf;

use ruleforge_core::sections::parse_heading;

use crate::context::{
    is_managed_end, marker_id, MergedFileContext, SectionContext, MANAGED_FILE_MARKER,
    MANAGED_MARKER,
};
use crate::engine::TemplateEngine;
use crate::error::ExportError;
use crate::exporter::{
    read_existing, Accumulator, Capabilities, ExportOptions, Exporter, ExporterDescriptor,
    Rendered, RenderedFile,
};
use crate::fidelity::{FidelityLog, Support};

/// When to prefix managed headings with their scope name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopePrefix {
    Off,
    /// Only when rules came from more than one scope.
    #[default]
    Auto,
    Always,
}

impl ScopePrefix {
    pub fn parse(exporter: &str, raw: Option<&str>) -> Result<Self, ExportError> {
        match raw {
            None | Some("auto") => Ok(ScopePrefix::Auto),
            Some("off") => Ok(ScopePrefix::Off),
            Some("always") => Ok(ScopePrefix::Always),
            Some(other) => Err(ExportError::Knob {
                exporter: exporter.to_string(),
                message: format!("scope_prefix must be off, auto or always, got '{other}'"),
            }),
        }
    }

    fn applies(self, populated_scopes: usize) -> bool {
        match self {
            ScopePrefix::Off => false,
            ScopePrefix::Auto => populated_scopes > 1,
            ScopePrefix::Always => true,
        }
    }
}

/// One merged markdown target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedTarget {
    pub name: &'static str,
    pub description: &'static str,
    pub path: &'static str,
}

pub const MERGED_TARGETS: &[MergedTarget] = &[
    MergedTarget { name: "agents", description: "AGENTS.md open agent instructions", path: "AGENTS.md" },
    MergedTarget { name: "claude", description: "Claude project memory", path: "CLAUDE.md" },
    MergedTarget { name: "gemini", description: "Gemini CLI context file", path: "GEMINI.md" },
    MergedTarget { name: "copilot", description: "GitHub Copilot repository instructions", path: ".github/copilot-instructions.md" },
    MergedTarget { name: "aider-md", description: "Aider conventions file", path: "CONVENTIONS.md" },
    MergedTarget { name: "warp", description: "Warp project rules", path: "WARP.md" },
    MergedTarget { name: "junie", description: "JetBrains Junie guidelines", path: ".junie/guidelines.md" },
    MergedTarget { name: "qwen", description: "Qwen Code context file", path: "QWEN.md" },
    MergedTarget { name: "crush", description: "Crush context file", path: "CRUSH.md" },
    MergedTarget { name: "openhands", description: "OpenHands repository microagent", path: ".openhands/microagents/repo.md" },
    MergedTarget { name: "goose", description: "Goose hints file", path: ".goosehints" },
    MergedTarget { name: "zed", description: "Zed project rules", path: ".rules" },
];

/// Single-file merging exporter for one [`MergedTarget`].
pub struct MergedMarkdownExporter {
    target: MergedTarget,
    descriptor: ExporterDescriptor,
}

impl MergedMarkdownExporter {
    pub fn new(target: MergedTarget) -> Self {
        let descriptor = ExporterDescriptor {
            name: target.name,
            description: target.description,
            capabilities: Capabilities {
                multi_file: false,
                scope_aware: true,
                preserves_content: true,
            },
            output_path_globs: vec![target.path.to_string()],
            known_gaps: vec![
                "machine-checkable check blocks",
                "autofix hints",
                "severity",
                "path globs",
                "vendor metadata",
            ],
        };
        MergedMarkdownExporter { target, descriptor }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.target.path)
    }
}

impl Exporter for MergedMarkdownExporter {
    fn descriptor(&self) -> &ExporterDescriptor {
        &self.descriptor
    }

    fn finalize(&self, acc: Accumulator, options: &ExportOptions) -> Result<Rendered, ExportError> {
        let prefix = ScopePrefix::parse(self.target.name, options.knob_str("scope_prefix"))?
            .applies(acc.populated_scopes());
        let rel = self.path();
        let existing = read_existing(&options.resolve(&rel))?;
        if acc.is_empty() && existing.is_none() {
            return Ok(Rendered::default());
        }

        let engine = TemplateEngine::new()?;
        let mut fidelity = FidelityLog::new(self.target.path);
        let support = Support {
            embeds_body: true,
            ..Support::default()
        };
        let mut rendered = Rendered::default();

        let mut canonical_headings: HashSet<String> = HashSet::new();
        let mut sections = Vec::new();
        for (scope, rule) in acc.rules() {
            fidelity.scan(rule, support, "");
            let heading = if prefix {
                format!("{}: {}", scope.name, rule.heading)
            } else {
                rule.heading.clone()
            };
            canonical_headings.insert(rule.heading_key());
            canonical_headings.insert(heading.trim().to_lowercase());
            sections.push(engine.render_section(&SectionContext::new(rule, heading))?);
        }

        let mut preserved = Vec::new();
        for block in existing.as_deref().map(parse_blocks).unwrap_or_default() {
            if block.managed {
                continue;
            }
            match &block.heading {
                Some(h) if canonical_headings.contains(&h.trim().to_lowercase()) => {
                    rendered.warnings.push(format!(
                        "unmanaged section '{h}' in {} replaced by the canonical rule",
                        self.target.path
                    ));
                }
                _ => {
                    let text = block.text();
                    if !text.is_empty() {
                        preserved.push(text);
                    }
                }
            }
        }
        if !preserved.is_empty() {
            tracing::warn!(
                "preserving {} user section(s) in {}",
                preserved.len(),
                self.target.path
            );
        }

        let ctx = MergedFileContext::new(sections, preserved.join("\n\n"));
        rendered.files.push(RenderedFile {
            path: rel,
            content: engine.render_merged_file(&ctx)?,
        });
        rendered.fidelity_notes = fidelity.into_notes();
        Ok(rendered)
    }
}

// ---------------------------------------------------------------------------
// Reading back an existing merged file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    managed: bool,
    /// A managed block stays open until its end banner.
    open: bool,
    heading: Option<String>,
    level: u8,
    lines: Vec<String>,
}

impl Block {
    fn new(managed: bool, heading: Option<(u8, &str)>) -> Self {
        Block {
            managed,
            open: managed,
            heading: heading.map(|(_, t)| t.to_string()),
            level: heading.map(|(l, _)| l).unwrap_or(0),
            lines: Vec::new(),
        }
    }

    /// Verbatim content with surrounding blank lines removed.
    fn text(&self) -> String {
        let start = self.lines.iter().position(|l| !l.trim().is_empty());
        let end = self.lines.iter().rposition(|l| !l.trim().is_empty());
        match (start, end) {
            (Some(s), Some(e)) => self.lines[s..=e].join("\n"),
            _ => String::new(),
        }
    }
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Split an existing merged file into managed and unmanaged blocks.
///
/// A managed block runs from its banner to its end banner (or the next
/// banner) and keeps every line in between. Outside managed blocks, a new
/// block starts at a heading no deeper than the current block's heading.
fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        if !in_fence && line.contains(MANAGED_FILE_MARKER) {
            continue;
        }
        if !in_fence && line.contains(MANAGED_MARKER) && marker_id(line).is_some() {
            blocks.push(Block::new(true, None));
            continue;
        }
        if !in_fence && is_managed_end(line) {
            if let Some(cur) = blocks.last_mut() {
                cur.open = false;
            }
            continue;
        }

        let heading = if in_fence { None } else { parse_heading(line) };
        if let Some(cur) = blocks.last_mut().filter(|b| b.managed && b.open) {
            if cur.heading.is_none() {
                if let Some((level, text)) = heading {
                    cur.heading = Some(text.to_string());
                    cur.level = level;
                }
            }
            cur.lines.push(line.to_string());
            continue;
        }

        let starts_new = match (blocks.last(), heading) {
            (None, _) => true,
            (Some(cur), _) if cur.managed => true,
            (Some(cur), Some((level, _))) => cur.heading.is_none() || level <= cur.level,
            (Some(_), None) => false,
        };
        if starts_new {
            blocks.push(Block::new(false, heading));
        }
        if let Some(cur) = blocks.last_mut() {
            cur.lines.push(line.to_string());
        }
    }
    blocks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::ExportRequest;
    use ruleforge_core::{Rule, Scope};
    use serde_json::json;
    use tempfile::TempDir;

    fn agents() -> MergedMarkdownExporter {
        MergedMarkdownExporter::new(MERGED_TARGETS[0])
    }

    fn run(root: &std::path::Path, scopes: &[(Scope, Vec<Rule>)], knobs: serde_json::Value) -> Rendered {
        let exporter = agents();
        let mut acc = exporter.begin();
        for (scope, rules) in scopes {
            exporter.accumulate(&mut acc, &ExportRequest { scope, rules });
        }
        exporter
            .finalize(acc, &ExportOptions::new(root).with_knobs(knobs))
            .expect("finalize")
    }

    fn web() -> Scope {
        Scope {
            name: "web".into(),
            path: "apps/web".into(),
            patterns: None,
        }
    }

    #[test]
    fn managed_sections_carry_banner() {
        let tmp = TempDir::new().unwrap();
        let rules = vec![Rule::new("t/r", "Testing", "Write tests.")];
        let out = run(tmp.path(), &[(Scope::root(), rules)], json!(null));
        let content = &out.files[0].content;
        assert!(content.contains("<!-- ruleforge:managed id=t/r -->\n## Testing\n\nWrite tests.\n"));
    }

    #[test]
    fn user_sections_survive_and_rerun_is_stable() {
        let tmp = TempDir::new().unwrap();
        let rules = vec![Rule::new("t/r", "Testing", "Write tests.")];
        let first = run(tmp.path(), &[(Scope::root(), rules.clone())], json!(null));
        let mut on_disk = first.files[0].content.clone();
        on_disk.push_str("\n## My Notes\n\nLocal only.\n\n### Detail\n\nstill mine\n");
        std::fs::write(tmp.path().join("AGENTS.md"), &on_disk).unwrap();

        let second = run(tmp.path(), &[(Scope::root(), rules.clone())], json!(null));
        let content = &second.files[0].content;
        assert!(content.contains("## My Notes\n\nLocal only.\n\n### Detail\n\nstill mine\n"));
        assert!(content.find("## Testing").unwrap() < content.find("## My Notes").unwrap());

        std::fs::write(tmp.path().join("AGENTS.md"), content).unwrap();
        let third = run(tmp.path(), &[(Scope::root(), rules)], json!(null));
        assert_eq!(&third.files[0].content, content);
    }

    #[test]
    fn removed_rule_drops_its_managed_section() {
        let tmp = TempDir::new().unwrap();
        let both = vec![Rule::new("a", "Alpha", "a"), Rule::new("b", "Beta", "b")];
        let first = run(tmp.path(), &[(Scope::root(), both)], json!(null));
        std::fs::write(tmp.path().join("AGENTS.md"), &first.files[0].content).unwrap();

        let second = run(tmp.path(), &[(Scope::root(), vec![Rule::new("a", "Alpha", "a")])], json!(null));
        assert!(!second.files[0].content.contains("Beta"));
    }

    #[test]
    fn unmanaged_copy_of_canonical_heading_is_replaced() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("AGENTS.md"), "## Testing\n\nold text\n").unwrap();
        let out = run(tmp.path(), &[(Scope::root(), vec![Rule::new("t", "Testing", "new")])], json!(null));
        assert!(!out.files[0].content.contains("old text"));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn scope_prefix_modes() {
        let tmp = TempDir::new().unwrap();
        let scopes = vec![
            (Scope::root(), vec![Rule::new("g", "General", "")]),
            (web(), vec![Rule::new("web/forms", "Forms", "")]),
        ];
        let auto = run(tmp.path(), &scopes, json!(null));
        assert!(auto.files[0].content.contains("## web: Forms"));
        assert!(auto.files[0].content.contains("## root: General"));

        let off = run(tmp.path(), &scopes, json!({"scope_prefix": "off"}));
        assert!(off.files[0].content.contains("## Forms"));

        let single = vec![(Scope::root(), vec![Rule::new("g", "General", "")])];
        let auto_single = run(tmp.path(), &single, json!({"scope_prefix": "auto"}));
        assert!(auto_single.files[0].content.contains("## General"));
        let always = run(tmp.path(), &single, json!({"scope_prefix": "always"}));
        assert!(always.files[0].content.contains("## root: General"));
    }

    #[test]
    fn invalid_scope_prefix_is_knob_error() {
        let tmp = TempDir::new().unwrap();
        let exporter = agents();
        let acc = exporter.begin();
        let err = exporter
            .finalize(acc, &ExportOptions::new(tmp.path()).with_knobs(json!({"scope_prefix": "sometimes"})))
            .unwrap_err();
        assert!(matches!(err, ExportError::Knob { .. }));
    }

    #[test]
    fn check_block_yields_fidelity_note() {
        let tmp = TempDir::new().unwrap();
        let mut rule = Rule::new("t/r", "Testing", "");
        rule.check = Some(json!({"type": "regex", "pattern": "todo!"}));
        let out = run(tmp.path(), &[(Scope::root(), vec![rule])], json!(null));
        assert_eq!(out.files.len(), 1);
        assert!(out.fidelity_notes.iter().any(|n| n.contains("check") && n.contains("t/r")));
    }

    #[test]
    fn nothing_to_do_emits_nothing() {
        let tmp = TempDir::new().unwrap();
        let out = run(tmp.path(), &[], json!(null));
        assert!(out.files.is_empty());
    }

    #[test]
    fn body_headings_stay_in_their_managed_section() {
        let tmp = TempDir::new().unwrap();
        let rules = vec![Rule::new("t/r", "Testing", "Intro.\n\n## Details\n\nMore.")];
        let first = run(tmp.path(), &[(Scope::root(), rules.clone())], json!(null));
        std::fs::write(tmp.path().join("AGENTS.md"), &first.files[0].content).unwrap();

        let blocks = parse_blocks(&first.files[0].content);
        assert!(blocks.iter().all(|b| b.managed || b.text().is_empty()), "{blocks:?}");

        let second = run(tmp.path(), &[(Scope::root(), rules)], json!(null));
        assert_eq!(second.files[0].content, first.files[0].content);
        assert_eq!(second.files[0].content.matches("## Details").count(), 1);
    }

    #[test]
    fn text_after_end_banner_is_user_content() {
        let blocks = parse_blocks(
            "<!-- ruleforge:managed id=a -->\n## A\n\nbody\n<!-- /ruleforge:managed -->\nloose note\n",
        );
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].managed);
        assert!(!blocks[1].managed);
        assert_eq!(blocks[1].text(), "loose note");
    }

    #[test]
    fn headings_in_code_fences_do_not_split() {
        let blocks = parse_blocks("## Mine\n```sh\n# comment\n```\nafter\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text(), "## Mine\n```sh\n# comment\n```\nafter");
    }
}
