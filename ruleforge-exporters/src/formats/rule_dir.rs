//! Rule-directory formats: one file per rule.
//!
//! # Path mapping
//!
//! | Exporter      | Output path                                   |
//! |---------------|-----------------------------------------------|
//! | `cursor`      | `<base>/.cursor/rules/<slug>.mdc`             |
//! | `windsurf`    | `<base>/.windsurf/rules/<slug>.md`            |
//! | `cline`       | `<base>/.clinerules/<slug>.md`                |
//! | `roo`         | `<base>/.roo/rules/<slug>.md`                 |
//! | `kilocode`    | `<base>/.kilocode/rules/<slug>.md`            |
//! | `amazonq`     | `<base>/.amazonq/rules/<slug>.md`             |
//! | `antigravity` | `<base>/.agent/rules/<slug>.md`               |
//! | `kiro`        | `<base>/.kiro/steering/<slug>.md`             |
//! | `trae`        | `<base>/.trae/rules/<slug>.md`                |
//! | `augment`     | `<base>/.augment/rules/<slug>.md`             |
//!
//! `<base>` is the rule's `nested_location`, else its scope path, else the
//! project root. Importing an exported file reverses the mapping.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use ruleforge_core::canonical::parse_yaml;
use ruleforge_core::rule_file::{id_from_path, split_front_matter};
use ruleforge_core::sections::parse_heading;
use ruleforge_core::{Rule, RuleId};

use crate::context::{marker_id, RuleFileContext};
use crate::engine::TemplateEngine;
use crate::error::ExportError;
use crate::exporter::{
    Accumulator, Capabilities, ExportOptions, Exporter, ExporterDescriptor, Rendered,
    RenderedFile,
};
use crate::fidelity::{FidelityLog, Support};

/// Front-matter key carrying other formats' vendor bags.
pub const FOREIGN_VENDOR_KEY: &str = "x-ruleforge-vendor";

/// How a dialect expresses activation and globs in front-matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontMatterStyle {
    /// `description`, `globs` (comma-separated), `alwaysApply`.
    Cursor,
    /// `trigger: always_on | glob`, `globs`, `description`.
    Trigger,
    /// `inclusion: always | fileMatch`, `fileMatchPattern`.
    Kiro,
    /// `type: always_apply`, `description`.
    Augment,
    /// `description` only.
    Plain,
}

impl FrontMatterStyle {
    fn native_globs(self) -> bool {
        matches!(self, Self::Cursor | Self::Trigger | Self::Kiro)
    }

    /// Keys this style writes itself.
    fn base_keys(self) -> &'static [&'static str] {
        match self {
            Self::Cursor => &["description", "globs", "alwaysApply"],
            Self::Trigger => &["trigger", "globs", "description"],
            Self::Kiro => &["inclusion", "fileMatchPattern"],
            Self::Augment => &["type", "description"],
            Self::Plain => &["description"],
        }
    }

    fn base(self, rule: &Rule) -> Map<String, Value> {
        let mut fm = Map::new();
        let globs = (!rule.globs.is_empty()).then(|| Value::String(rule.globs.join(",")));
        let description = Value::String(rule.heading.clone());
        match self {
            Self::Cursor => {
                fm.insert("description".into(), description);
                if let Some(g) = globs {
                    fm.insert("globs".into(), g);
                }
                fm.insert("alwaysApply".into(), Value::Bool(rule.globs.is_empty()));
            }
            Self::Trigger => {
                let trigger = if globs.is_some() { "glob" } else { "always_on" };
                fm.insert("trigger".into(), Value::String(trigger.into()));
                if let Some(g) = globs {
                    fm.insert("globs".into(), g);
                }
                fm.insert("description".into(), description);
            }
            Self::Kiro => {
                match globs {
                    Some(g) => {
                        fm.insert("inclusion".into(), Value::String("fileMatch".into()));
                        fm.insert("fileMatchPattern".into(), g);
                    }
                    None => {
                        fm.insert("inclusion".into(), Value::String("always".into()));
                    }
                }
            }
            Self::Augment => {
                fm.insert("type".into(), Value::String("always_apply".into()));
                fm.insert("description".into(), description);
            }
            Self::Plain => {
                fm.insert("description".into(), description);
            }
        }
        fm
    }

    /// Recover globs written by [`FrontMatterStyle::base`].
    fn globs_from(self, fm: &Map<String, Value>) -> Vec<String> {
        let key = match self {
            Self::Kiro => "fileMatchPattern",
            Self::Cursor | Self::Trigger => "globs",
            Self::Augment | Self::Plain => return Vec::new(),
        };
        match fm.get(key) {
            Some(Value::String(s)) => split_globs(s),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Split a comma-separated glob list, leaving commas inside `{a,b}`
/// alternations alone.
fn split_globs(list: &str) -> Vec<String> {
    let mut globs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                globs.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    globs.push(&list[start..]);
    globs
        .into_iter()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect()
}

/// One rule-directory dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub description: &'static str,
    /// Directory below `<base>`, `/`-separated.
    pub dir: &'static str,
    pub ext: &'static str,
    pub style: FrontMatterStyle,
}

pub const DIALECTS: &[Dialect] = &[
    Dialect { name: "cursor", description: "Cursor project rules (.mdc)", dir: ".cursor/rules", ext: "mdc", style: FrontMatterStyle::Cursor },
    Dialect { name: "windsurf", description: "Windsurf workspace rules", dir: ".windsurf/rules", ext: "md", style: FrontMatterStyle::Trigger },
    Dialect { name: "cline", description: "Cline rules directory", dir: ".clinerules", ext: "md", style: FrontMatterStyle::Plain },
    Dialect { name: "roo", description: "Roo Code rules directory", dir: ".roo/rules", ext: "md", style: FrontMatterStyle::Plain },
    Dialect { name: "kilocode", description: "Kilo Code rules directory", dir: ".kilocode/rules", ext: "md", style: FrontMatterStyle::Plain },
    Dialect { name: "amazonq", description: "Amazon Q developer rules", dir: ".amazonq/rules", ext: "md", style: FrontMatterStyle::Plain },
    Dialect { name: "antigravity", description: "Antigravity workspace rules", dir: ".agent/rules", ext: "md", style: FrontMatterStyle::Trigger },
    Dialect { name: "kiro", description: "Kiro steering documents", dir: ".kiro/steering", ext: "md", style: FrontMatterStyle::Kiro },
    Dialect { name: "trae", description: "Trae project rules", dir: ".trae/rules", ext: "md", style: FrontMatterStyle::Plain },
    Dialect { name: "augment", description: "Augment workspace rules", dir: ".augment/rules", ext: "md", style: FrontMatterStyle::Augment },
];

/// Multi-file exporter for one [`Dialect`].
pub struct RuleDirExporter {
    dialect: Dialect,
    descriptor: ExporterDescriptor,
}

impl RuleDirExporter {
    pub fn new(dialect: Dialect) -> Self {
        let mut known_gaps = vec![
            "machine-checkable check blocks",
            "autofix hints",
            "severity",
        ];
        if !dialect.style.native_globs() {
            known_gaps.push("path globs");
        }
        let descriptor = ExporterDescriptor {
            name: dialect.name,
            description: dialect.description,
            capabilities: Capabilities {
                multi_file: true,
                scope_aware: true,
                preserves_content: false,
            },
            output_path_globs: vec![
                format!("{}/*.{}", dialect.dir, dialect.ext),
                format!("**/{}/*.{}", dialect.dir, dialect.ext),
            ],
            known_gaps,
        };
        RuleDirExporter {
            dialect,
            descriptor,
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn support(&self) -> Support {
        Support {
            globs: self.dialect.style.native_globs(),
            carries_vendor: true,
            embeds_body: true,
            ..Support::default()
        }
    }

    /// Front-matter for `rule`: dialect keys, then this format's own vendor
    /// keys on top, then every other vendor bag under [`FOREIGN_VENDOR_KEY`].
    pub fn front_matter(&self, rule: &Rule) -> Map<String, Value> {
        let mut fm = self.dialect.style.base(rule);
        if let Some(own) = rule.vendor_for(self.dialect.name) {
            for (k, v) in own {
                fm.insert(k.clone(), v.clone());
            }
        }
        let foreign: Map<String, Value> = rule
            .vendor
            .iter()
            .filter(|(k, _)| k.as_str() != self.dialect.name)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !foreign.is_empty() {
            fm.insert(FOREIGN_VENDOR_KEY.into(), Value::Object(foreign));
        }
        fm
    }

    /// Relative output path for `rule` exported from a scope at `scope_path`.
    pub fn output_path(&self, rule: &Rule, scope_path: &str, slug: &str) -> PathBuf {
        let base = rule.location().unwrap_or(scope_path);
        let file = format!("{}/{}.{}", self.dialect.dir, slug, self.dialect.ext);
        if base.is_empty() {
            PathBuf::from(file)
        } else {
            PathBuf::from(format!("{base}/{file}"))
        }
    }

    /// Parse a previously exported file back into a rule.
    ///
    /// `rel_path` is relative to the export root; the directory prefix in
    /// front of the dialect directory becomes `nested_location`.
    pub fn import_rule_file(&self, text: &str, rel_path: &Path) -> Result<Rule, ExportError> {
        let malformed = |message: String| ExportError::Malformed {
            path: rel_path.to_path_buf(),
            message,
        };
        let text = text.replace("\r\n", "\n");
        let (yaml, body) =
            split_front_matter(&text).ok_or_else(|| malformed("missing front-matter".into()))?;
        let fm = match parse_yaml(yaml).map_err(|e| malformed(e.to_string()))? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(malformed("front-matter is not a mapping".into())),
        };

        let mut id = None;
        let mut heading = None;
        let mut level = 2;
        let mut rest: Vec<&str> = Vec::new();
        for line in body.lines() {
            if heading.is_none() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(found) = marker_id(line) {
                    id = Some(found.to_string());
                    continue;
                }
                if let Some((lvl, text)) = parse_heading(line) {
                    heading = Some(text.to_string());
                    level = lvl;
                    continue;
                }
            }
            rest.push(line);
        }

        let rel = rel_path.to_string_lossy().replace('\\', "/");
        let location = self.location_from_path(&rel);
        let fallback_id = id_from_path(Path::new(
            Path::new(&rel).file_name().unwrap_or_default(),
        ));
        let heading = heading
            .or_else(|| fm.get("description").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| fallback_id.0.clone());

        let mut rule = Rule::new(
            id.map(RuleId).unwrap_or(fallback_id),
            heading,
            rest.join("\n").trim_matches('\n').to_string(),
        );
        rule.level = level;
        rule.globs = self.dialect.style.globs_from(&fm);
        rule.nested_location = location;

        let base_keys = self.dialect.style.base_keys();
        let mut own = Map::new();
        for (k, v) in fm {
            if k == FOREIGN_VENDOR_KEY {
                if let Value::Object(foreign) = v {
                    rule.vendor.extend(foreign);
                }
            } else if !base_keys.contains(&k.as_str()) {
                own.insert(k, v);
            }
        }
        if !own.is_empty() {
            rule.vendor.insert(self.dialect.name.to_string(), Value::Object(own));
        }
        Ok(rule)
    }

    fn location_from_path(&self, rel: &str) -> Option<String> {
        let needle = format!("/{}/", self.dialect.dir);
        rel.find(&needle)
            .map(|idx| rel[..idx].to_string())
            .filter(|base| !base.is_empty())
    }
}

impl Exporter for RuleDirExporter {
    fn descriptor(&self) -> &ExporterDescriptor {
        &self.descriptor
    }

    fn finalize(&self, acc: Accumulator, _options: &ExportOptions) -> Result<Rendered, ExportError> {
        let engine = TemplateEngine::new()?;
        let mut fidelity = FidelityLog::new(self.dialect.name);
        let mut rendered = Rendered::default();
        let mut taken: BTreeSet<PathBuf> = BTreeSet::new();

        for (scope, rule) in acc.rules() {
            fidelity.scan(rule, self.support(), self.dialect.name);

            let slug = rule.slug();
            let mut path = self.output_path(rule, &scope.path, &slug);
            let mut n = 2;
            while taken.contains(&path) {
                path = self.output_path(rule, &scope.path, &format!("{slug}-{n}"));
                n += 1;
            }
            if n > 2 {
                rendered.warnings.push(format!(
                    "rule '{}' collides with another rule's file name; wrote {}",
                    rule.id,
                    path.display()
                ));
            }
            taken.insert(path.clone());

            let front_matter = serde_yaml::to_string(&self.front_matter(rule))?;
            let content = engine.render_rule_file(&RuleFileContext::new(rule, front_matter))?;
            rendered.files.push(RenderedFile { path, content });
        }

        rendered.fidelity_notes = fidelity.into_notes();
        Ok(rendered)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::ExportRequest;
    use ruleforge_core::{Scope, Severity};
    use serde_json::json;

    fn cursor() -> RuleDirExporter {
        RuleDirExporter::new(DIALECTS[0])
    }

    fn run(exporter: &RuleDirExporter, scope: &Scope, rules: &[Rule]) -> Rendered {
        let mut acc = exporter.begin();
        exporter.accumulate(&mut acc, &ExportRequest { scope, rules });
        exporter
            .finalize(acc, &ExportOptions::new("/unused"))
            .expect("finalize")
    }

    #[test]
    fn cursor_front_matter_and_marker() {
        let mut rule = Rule::new("testing/standards", "Testing Standards", "Write tests.");
        rule.globs = vec!["**/*.rs".into()];
        let out = run(&cursor(), &Scope::root(), &[rule]);
        assert_eq!(out.files.len(), 1);
        let file = &out.files[0];
        assert_eq!(file.path, PathBuf::from(".cursor/rules/testing-standards.mdc"));
        assert!(file.content.contains("description: Testing Standards"));
        assert!(file.content.contains("**/*.rs"), "{}", file.content);
        assert!(file.content.contains("alwaysApply: false"));
        assert!(file.content.contains("ruleforge:generated id=testing/standards"));
    }

    #[test]
    fn own_vendor_overrides_and_foreign_is_carried() {
        let mut rule = Rule::new("r", "R", "");
        rule.vendor.insert("cursor".into(), json!({"alwaysApply": true}));
        rule.vendor.insert("windsurf".into(), json!({"trigger": "manual"}));
        let fm = cursor().front_matter(&rule);
        assert_eq!(fm["alwaysApply"], json!(true));
        assert_eq!(fm[FOREIGN_VENDOR_KEY], json!({"windsurf": {"trigger": "manual"}}));
    }

    #[test]
    fn nested_location_drives_path() {
        let mut rule = Rule::new("docs/style", "Docs", "");
        rule.nested_location = Some("apps/docs".into());
        let out = run(&cursor(), &Scope::root(), &[rule]);
        assert_eq!(out.files[0].path, PathBuf::from("apps/docs/.cursor/rules/docs-style.mdc"));
    }

    #[test]
    fn scope_path_used_without_location() {
        let scope = Scope {
            name: "web".into(),
            path: "apps/web".into(),
            patterns: Some(vec!["web/*".into()]),
        };
        let out = run(&cursor(), &scope, &[Rule::new("web/forms", "Forms", "")]);
        assert_eq!(out.files[0].path, PathBuf::from("apps/web/.cursor/rules/web-forms.mdc"));
    }

    #[test]
    fn import_restores_rule() {
        let exporter = cursor();
        let mut rule = Rule::new("docs/style", "Docs Style", "Use sentence case.\n\n### Detail\nmore");
        rule.nested_location = Some("apps/docs".into());
        rule.globs = vec!["**/*.md".into(), "**/*.mdx".into()];
        rule.vendor.insert("windsurf".into(), json!({"trigger": "manual"}));

        let out = run(&exporter, &Scope::root(), std::slice::from_ref(&rule));
        let file = &out.files[0];
        let back = exporter.import_rule_file(&file.content, &file.path).expect("import");
        assert_eq!(back.id, rule.id);
        assert_eq!(back.heading, rule.heading);
        assert_eq!(back.body, rule.body);
        assert_eq!(back.nested_location.as_deref(), Some("apps/docs"));
        assert_eq!(back.globs, rule.globs);
        assert_eq!(back.vendor["windsurf"], json!({"trigger": "manual"}));
    }

    #[test]
    fn brace_globs_survive_import() {
        let exporter = cursor();
        let mut rule = Rule::new("web/ts", "TypeScript", "x");
        rule.globs = vec!["**/*.{ts,tsx}".into(), "src/{a,b}/**".into()];
        let out = run(&exporter, &Scope::root(), std::slice::from_ref(&rule));
        let back = exporter
            .import_rule_file(&out.files[0].content, &out.files[0].path)
            .unwrap();
        assert_eq!(back.globs, rule.globs);
    }

    #[test]
    fn glob_list_splits_outside_braces() {
        assert_eq!(split_globs("*.rs, *.{md,mdx},"), vec!["*.rs", "*.{md,mdx}"]);
        assert_eq!(split_globs(""), Vec::<String>::new());
    }

    #[test]
    fn import_root_file_has_no_location() {
        let exporter = RuleDirExporter::new(DIALECTS[2]);
        let out = run(&exporter, &Scope::root(), &[Rule::new("a", "A", "x")]);
        let back = exporter
            .import_rule_file(&out.files[0].content, &out.files[0].path)
            .unwrap();
        assert_eq!(back.nested_location, None);
    }

    #[test]
    fn unrepresentable_features_are_noted() {
        let mut rule = Rule::new("r", "R", "");
        rule.check = Some(json!({"pattern": "unwrap\\("}));
        rule.severity = Severity::Error;
        rule.globs = vec!["*.rs".into()];
        let out = run(&RuleDirExporter::new(DIALECTS[2]), &Scope::root(), &[rule]);
        let notes = out.fidelity_notes.join("\n");
        assert!(notes.contains("check"), "{notes}");
        assert!(notes.contains("severity"), "{notes}");
        assert!(notes.contains("globs"), "{notes}");
    }

    #[test]
    fn colliding_slugs_get_suffix() {
        let rules = [Rule::new("a/b", "One", ""), Rule::new("a-b", "Two", "")];
        let out = run(&cursor(), &Scope::root(), &rules);
        assert_eq!(out.files[1].path, PathBuf::from(".cursor/rules/a-b-2.mdc"));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn kiro_uses_file_match() {
        let mut rule = Rule::new("r", "R", "");
        rule.globs = vec!["src/**".into()];
        let fm = RuleDirExporter::new(DIALECTS[7]).front_matter(&rule);
        assert_eq!(fm["inclusion"], json!("fileMatch"));
        assert_eq!(fm["fileMatchPattern"], json!("src/**"));
    }
}
