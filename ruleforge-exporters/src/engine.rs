//! Tera rendering engine with the embedded layout templates.
//!
//! | Template                | Used by                                |
//! |-------------------------|----------------------------------------|
//! | `rule_dir/rule.tera`    | every rule-directory (multi-file) format |
//! | `merged/section.tera`   | one managed section of a merged file   |
//! | `merged/file.tera`      | a whole merged markdown file           |

use tera::Tera;

use crate::context::{to_tera_context, MergedFileContext, RuleFileContext, SectionContext};
use crate::error::ExportError;

// ---------------------------------------------------------------------------
// Embedded templates
// ---------------------------------------------------------------------------

const RULE_FILE_TPL: &str = "---\n{{ front_matter }}---\n<!-- {{ marker }} -->\n\n{{ hashes }} {{ heading }}\n{% if body %}\n{{ body }}\n{% endif %}";

const SECTION_TPL: &str =
    "<!-- {{ banner }} -->\n{{ hashes }} {{ heading }}\n{% if body %}\n{{ body }}\n{% endif %}<!-- {{ end_banner }} -->\n";

const MERGED_FILE_TPL: &str = "<!-- {{ file_banner }} -->\n{% for section in sections %}\n{{ section }}{% endfor %}{% if preserved %}\n{{ preserved }}\n{% endif %}";

const TPLS: &[(&str, &str)] = &[
    ("rule_dir/rule.tera", RULE_FILE_TPL),
    ("merged/section.tera", SECTION_TPL),
    ("merged/file.tera", MERGED_FILE_TPL),
];

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera engine holding the embedded templates. Create once per run.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Result<Self, ExportError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(TPLS.iter().copied())?;
        Ok(TemplateEngine { tera })
    }

    pub fn render_rule_file(&self, ctx: &RuleFileContext) -> Result<String, ExportError> {
        self.render("rule_dir/rule.tera", &to_tera_context(ctx)?)
    }

    pub fn render_section(&self, ctx: &SectionContext) -> Result<String, ExportError> {
        self.render("merged/section.tera", &to_tera_context(ctx)?)
    }

    pub fn render_merged_file(&self, ctx: &MergedFileContext) -> Result<String, ExportError> {
        self.render("merged/file.tera", &to_tera_context(ctx)?)
    }

    fn render(&self, name: &str, ctx: &tera::Context) -> Result<String, ExportError> {
        let out = self.tera.render(name, ctx)?;
        Ok(out.replace("\r\n", "\n"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
