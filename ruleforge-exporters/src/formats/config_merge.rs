//! Tool-configuration formats: a managed key inside a JSON or YAML file
//! that points the tool at the generated instruction files.
//!
//! | Exporter          | File                    | Managed key                                          |
//! |-------------------|-------------------------|------------------------------------------------------|
//! | `gemini-settings` | `.gemini/settings.json` | `contextFileName`                                    |
//! | `opencode`        | `opencode.json`         | `instructions`                                       |
//! | `vscode`          | `.vscode/settings.json` | `github.copilot.chat.codeGeneration.instructions`    |
//! | `aider-config`    | `.aider.conf.yml`       | `read`                                               |
//!
//! Every other key in the file is left as found.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::ExportError;
use crate::exporter::{
    read_existing, Accumulator, Capabilities, ExportOptions, Exporter, ExporterDescriptor,
    Rendered, RenderedFile,
};
use crate::fidelity::{FidelityLog, Support};

/// File syntax of a config target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Json,
    Yaml,
}

/// Shape of the managed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryShape {
    /// `["AGENTS.md", "docs/rules.md"]`
    Paths,
    /// `[{"file": "AGENTS.md"}]`
    FileObjects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigTarget {
    pub name: &'static str,
    pub description: &'static str,
    pub path: &'static str,
    pub key: &'static str,
    pub syntax: Syntax,
    pub shape: EntryShape,
    /// Instruction file referenced when the `files` knob is unset.
    pub default_file: &'static str,
}

pub const CONFIG_TARGETS: &[ConfigTarget] = &[
    ConfigTarget {
        name: "gemini-settings",
        description: "Gemini CLI settings (contextFileName)",
        path: ".gemini/settings.json",
        key: "contextFileName",
        syntax: Syntax::Json,
        shape: EntryShape::Paths,
        default_file: "AGENTS.md",
    },
    ConfigTarget {
        name: "opencode",
        description: "opencode configuration (instructions)",
        path: "opencode.json",
        key: "instructions",
        syntax: Syntax::Json,
        shape: EntryShape::Paths,
        default_file: "AGENTS.md",
    },
    ConfigTarget {
        name: "vscode",
        description: "VS Code Copilot code-generation instructions",
        path: ".vscode/settings.json",
        key: "github.copilot.chat.codeGeneration.instructions",
        syntax: Syntax::Json,
        shape: EntryShape::FileObjects,
        default_file: ".github/copilot-instructions.md",
    },
    ConfigTarget {
        name: "aider-config",
        description: "Aider configuration (read)",
        path: ".aider.conf.yml",
        key: "read",
        syntax: Syntax::Yaml,
        shape: EntryShape::Paths,
        default_file: "CONVENTIONS.md",
    },
];

/// Config-merging exporter for one [`ConfigTarget`].
pub struct ConfigMergeExporter {
    target: ConfigTarget,
    descriptor: ExporterDescriptor,
}

impl ConfigMergeExporter {
    pub fn new(target: ConfigTarget) -> Self {
        let descriptor = ExporterDescriptor {
            name: target.name,
            description: target.description,
            capabilities: Capabilities {
                multi_file: false,
                scope_aware: true,
                preserves_content: true,
            },
            output_path_globs: vec![target.path.to_string()],
            known_gaps: vec!["rule bodies are referenced, not embedded"],
        };
        ConfigMergeExporter { target, descriptor }
    }

    /// Referenced files: the `files` knob, or the default file at the root.
    ///
    /// Merged exporters write a single root file whatever the scopes, so
    /// nothing per-scope is referenced.
    fn referenced_files(&self, options: &ExportOptions) -> Result<Vec<String>, ExportError> {
        if let Some(files) = options.knobs.get("files") {
            let invalid = || ExportError::Knob {
                exporter: self.target.name.to_string(),
                message: "files must be a list of strings".to_string(),
            };
            return files
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|v| v.as_str().map(String::from).ok_or_else(invalid))
                .collect();
        }
        Ok(vec![self.target.default_file.to_string()])
    }

    fn managed_value(&self, files: Vec<String>) -> Value {
        match self.target.shape {
            EntryShape::Paths => Value::Array(files.into_iter().map(Value::String).collect()),
            EntryShape::FileObjects => Value::Array(
                files
                    .into_iter()
                    .map(|f| {
                        let mut obj = Map::new();
                        obj.insert("file".into(), Value::String(f));
                        Value::Object(obj)
                    })
                    .collect(),
            ),
        }
    }

    fn merge_json(&self, existing: Option<&str>, path: &Path, value: Value) -> Result<String, ExportError> {
        let mut root = match existing.map(str::trim).filter(|t| !t.is_empty()) {
            None => Map::new(),
            Some(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(ExportError::Malformed {
                        path: path.to_path_buf(),
                        message: "top level is not a JSON object".to_string(),
                    })
                }
                Err(e) if has_jsonc_syntax(text) => {
                    return Err(ExportError::Malformed {
                        path: path.to_path_buf(),
                        message: format!(
                            "contains comments or trailing commas ({e}); ruleforge rewrites this file \
                             as plain JSON, so remove them or drop the '{}' exporter",
                            self.target.name
                        ),
                    })
                }
                Err(e) => {
                    return Err(ExportError::Malformed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })
                }
            },
        };
        root.insert(self.target.key.to_string(), value);
        let mut out = serde_json::to_string_pretty(&Value::Object(root))?;
        out.push('\n');
        Ok(out)
    }

    fn merge_yaml(
        &self,
        existing: Option<&str>,
        path: &Path,
        value: Value,
        warnings: &mut Vec<String>,
    ) -> Result<String, ExportError> {
        let mut root = match existing.filter(|t| !t.trim().is_empty()) {
            None => serde_yaml::Mapping::new(),
            Some(text) => {
                if text.lines().any(|l| l.trim_start().starts_with('#')) {
                    warnings.push(format!("comments in {} are not preserved", self.target.path));
                }
                match serde_yaml::from_str::<serde_yaml::Value>(text) {
                    Ok(serde_yaml::Value::Mapping(map)) => map,
                    Ok(serde_yaml::Value::Null) => serde_yaml::Mapping::new(),
                    Ok(_) => {
                        return Err(ExportError::Malformed {
                            path: path.to_path_buf(),
                            message: "top level is not a YAML mapping".to_string(),
                        })
                    }
                    Err(e) => {
                        return Err(ExportError::Malformed {
                            path: path.to_path_buf(),
                            message: e.to_string(),
                        })
                    }
                }
            }
        };
        root.insert(
            serde_yaml::Value::String(self.target.key.to_string()),
            serde_yaml::to_value(value)?,
        );
        Ok(serde_yaml::to_string(&root)?)
    }
}

/// Does `text` use JSONC extensions (`//`, `/* */`, or a comma before a
/// closing bracket) outside string literals?
fn has_jsonc_syntax(text: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant = ' ';
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '/' if matches!(chars.peek(), Some(&'/') | Some(&'*')) => return true,
            '}' | ']' if last_significant == ',' => return true,
            _ => {}
        }
        if !c.is_whitespace() {
            last_significant = c;
        }
    }
    false
}

impl Exporter for ConfigMergeExporter {
    fn descriptor(&self) -> &ExporterDescriptor {
        &self.descriptor
    }

    fn finalize(&self, acc: Accumulator, options: &ExportOptions) -> Result<Rendered, ExportError> {
        let rel = PathBuf::from(self.target.path);
        let abs = options.resolve(&rel);
        let existing = read_existing(&abs)?;
        if acc.is_empty() && existing.is_none() {
            return Ok(Rendered::default());
        }

        let mut fidelity = FidelityLog::new(self.target.name);
        let support = Support {
            check: true,
            autofix: true,
            severity: true,
            globs: true,
            carries_vendor: true,
            embeds_body: false,
        };
        for (_, rule) in acc.rules() {
            fidelity.scan(rule, support, self.target.name);
        }

        let value = self.managed_value(self.referenced_files(options)?);
        let mut rendered = Rendered::default();
        let content = match self.target.syntax {
            Syntax::Json => self.merge_json(existing.as_deref(), &abs, value)?,
            Syntax::Yaml => self.merge_yaml(existing.as_deref(), &abs, value, &mut rendered.warnings)?,
        };
        rendered.files.push(RenderedFile { path: rel, content });
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
    use ruleforge_core::{Rule, Scope};
    use serde_json::json;
    use tempfile::TempDir;

    fn target(name: &str) -> ConfigMergeExporter {
        let t = CONFIG_TARGETS.iter().find(|t| t.name == name).copied().unwrap();
        ConfigMergeExporter::new(t)
    }

    fn run(exporter: &ConfigMergeExporter, root: &Path, knobs: Value) -> Result<Rendered, ExportError> {
        let web = Scope {
            name: "web".into(),
            path: "apps/web".into(),
            patterns: None,
        };
        let root_rules = [Rule::new("g", "General", "x")];
        let web_rules = [Rule::new("web/forms", "Forms", "y")];
        let mut acc = exporter.begin();
        exporter.accumulate(&mut acc, &ExportRequest { scope: &Scope::root(), rules: &root_rules });
        exporter.accumulate(&mut acc, &ExportRequest { scope: &web, rules: &web_rules });
        exporter.finalize(acc, &ExportOptions::new(root).with_knobs(knobs))
    }

    #[test]
    fn json_merge_preserves_other_keys() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".gemini")).unwrap();
        std::fs::write(
            tmp.path().join(".gemini/settings.json"),
            r#"{"theme": "dark", "contextFileName": "OLD.md", "z": 1}"#,
        )
        .unwrap();

        let out = run(&target("gemini-settings"), tmp.path(), Value::Null).unwrap();
        let value: Value = serde_json::from_str(&out.files[0].content).unwrap();
        assert_eq!(value["theme"], json!("dark"));
        assert_eq!(value["z"], json!(1));
        assert_eq!(value["contextFileName"], json!(["AGENTS.md"]));
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["theme", "contextFileName", "z"]);
    }

    #[test]
    fn vscode_uses_file_objects() {
        let tmp = TempDir::new().unwrap();
        let out = run(&target("vscode"), tmp.path(), json!({"files": ["docs/rules.md"]})).unwrap();
        let value: Value = serde_json::from_str(&out.files[0].content).unwrap();
        assert_eq!(
            value["github.copilot.chat.codeGeneration.instructions"],
            json!([{"file": "docs/rules.md"}])
        );
    }

    #[test]
    fn non_object_json_is_malformed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("opencode.json"), "[1, 2]").unwrap();
        let err = run(&target("opencode"), tmp.path(), Value::Null).unwrap_err();
        assert!(matches!(err, ExportError::Malformed { .. }));
    }

    #[test]
    fn yaml_merge_sets_read_list() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".aider.conf.yml"), "# mine\nmodel: sonnet\n").unwrap();
        let out = run(&target("aider-config"), tmp.path(), Value::Null).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&out.files[0].content).unwrap();
        assert_eq!(value["model"], serde_yaml::Value::from("sonnet"));
        assert_eq!(value["read"][0], serde_yaml::Value::from("CONVENTIONS.md"));
        assert_eq!(value["read"].as_sequence().map(Vec::len), Some(1));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn jsonc_settings_get_a_clear_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".vscode")).unwrap();
        std::fs::write(
            tmp.path().join(".vscode/settings.json"),
            "{\n  // editor\n  \"editor.tabSize\": 2,\n}\n",
        )
        .unwrap();
        let err = run(&target("vscode"), tmp.path(), Value::Null).unwrap_err();
        assert!(matches!(err, ExportError::Malformed { .. }));
        assert!(err.to_string().contains("comments or trailing commas"), "{err}");
    }

    #[test]
    fn jsonc_detection_ignores_strings() {
        assert!(has_jsonc_syntax("{\"a\": 1, /* x */ \"b\": 2}"));
        assert!(has_jsonc_syntax("[1, 2, ]"));
        assert!(!has_jsonc_syntax("{\"url\": \"https://example.com\", \"s\": \"a,]\"}"));
        assert!(!has_jsonc_syntax("{\"a\": [1, 2]}"));
    }

    #[test]
    fn bodies_referenced_note() {
        let tmp = TempDir::new().unwrap();
        let out = run(&target("opencode"), tmp.path(), Value::Null).unwrap();
        assert_eq!(out.fidelity_notes.len(), 1);
        assert!(out.fidelity_notes[0].contains("referenced"));
    }

    #[test]
    fn bad_files_knob() {
        let tmp = TempDir::new().unwrap();
        let err = run(&target("opencode"), tmp.path(), json!({"files": "AGENTS.md"})).unwrap_err();
        assert!(matches!(err, ExportError::Knob { .. }));
    }
}
