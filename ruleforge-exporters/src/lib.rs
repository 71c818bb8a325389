//! # ruleforge-exporters
//!
//! Renders the canonical rule set into every supported target format.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ruleforge_core::{Rule, Scope};
//! use ruleforge_exporters::{ExportOptions, ExportRequest, Registry};
//!
//! fn render(rules: &[Rule]) {
//!     let registry = Registry::builtin();
//!     if let Some(exporter) = registry.get("agents") {
//!         let mut acc = exporter.begin();
//!         exporter.accumulate(&mut acc, &ExportRequest { scope: &Scope::root(), rules });
//!         if let Ok(rendered) = exporter.finalize(acc, &ExportOptions::new(".")) {
//!             for file in rendered.files {
//!                 println!("{}: {} bytes", file.path.display(), file.content.len());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod fidelity;
pub mod formats;
pub mod registry;

pub use context::{GENERATED_MARKER, MANAGED_MARKER};
pub use engine::TemplateEngine;
pub use error::ExportError;
pub use exporter::{
    Accumulator, Capabilities, ExportOptions, ExportRequest, Exporter, ExporterDescriptor,
    ExporterManifest, Rendered, RenderedFile, ScopeRules,
};
pub use registry::Registry;
