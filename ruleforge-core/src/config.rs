//! Project configuration and path helpers.
//!
//! # Storage layout
//!
//! ```text
//! <project>/
//!   .ruleforge/
//!     config.yaml        (project config)
//!     rules/**/*.md      (canonical rule files, authoritative)
//!     lock.json          (team mode lockfile)
//!     allow.yaml         (human-curated allow-list of approved bundle hashes)
//!     checksums.json     (checksum records for exports and sources)
//! ```
//!
//! Every function takes the project root explicitly; nothing reads the
//! process working directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{io_err, CoreError};
use crate::scope::relative_path;
use crate::types::{PackMeta, Scope};

pub const CONFIG_DIR: &str = ".ruleforge";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/.ruleforge/`
pub fn config_dir_at(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR)
}

/// `<root>/.ruleforge/config.yaml`
pub fn config_path_at(root: &Path) -> PathBuf {
    config_dir_at(root).join("config.yaml")
}

/// `<root>/.ruleforge/rules/`
pub fn rules_dir_at(root: &Path) -> PathBuf {
    config_dir_at(root).join("rules")
}

/// `<root>/.ruleforge/lock.json`
pub fn lockfile_path_at(root: &Path) -> PathBuf {
    config_dir_at(root).join("lock.json")
}

/// `<root>/.ruleforge/allow.yaml`
pub fn allowlist_path_at(root: &Path) -> PathBuf {
    config_dir_at(root).join("allow.yaml")
}

/// `<root>/.ruleforge/checksums.json`
pub fn checksum_store_path_at(root: &Path) -> PathBuf {
    config_dir_at(root).join("checksums.json")
}

// ---------------------------------------------------------------------------
// 2. Config types
// ---------------------------------------------------------------------------

fn default_version() -> u32 {
    1
}

fn default_sources() -> Vec<PathBuf> {
    vec![PathBuf::from(CONFIG_DIR).join("rules")]
}

fn default_exporters() -> Vec<String> {
    vec!["agents".to_string()]
}

/// Pack identity written into every canonical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackConfig {
    pub id: String,
    #[serde(default = "default_pack_version")]
    pub version: String,
}

fn default_pack_version() -> String {
    "0.0.0".to_string()
}

impl Default for PackConfig {
    fn default() -> Self {
        PackConfig {
            id: "project".to_string(),
            version: default_pack_version(),
        }
    }
}

/// A configured scope (project subtree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Rule id patterns; omitted means "rules whose nested_location is
    /// under `path`".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
}

/// A declarative set/remove patch addressed by selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlaySpec {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

/// Lockfile policy. `Off` means solo mode: no lockfile is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    #[default]
    Off,
    Soft,
    Strict,
}

impl LockMode {
    pub fn is_team(self) -> bool {
        !matches!(self, LockMode::Off)
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Off => write!(f, "off"),
            LockMode::Soft => write!(f, "soft"),
            LockMode::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LockfileConfig {
    #[serde(default)]
    pub mode: LockMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StaleConfig {
    /// Delete stale exports instead of only warning about them.
    #[serde(default)]
    pub clean: bool,
}

/// Root of `.ruleforge/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub pack: PackConfig,
    /// Candidate rule sources (files or directories), project-relative.
    #[serde(default = "default_sources")]
    pub sources: Vec<PathBuf>,
    /// Enabled exporter names, in run order.
    #[serde(default = "default_exporters")]
    pub exporters: Vec<String>,
    /// Per-exporter knobs, keyed by exporter name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exporter_config: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<ScopeConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<OverlaySpec>,
    #[serde(default)]
    pub lockfile: LockfileConfig,
    #[serde(default)]
    pub stale: StaleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: default_version(),
            pack: PackConfig::default(),
            sources: default_sources(),
            exporters: default_exporters(),
            exporter_config: BTreeMap::new(),
            scopes: Vec::new(),
            overlays: Vec::new(),
            lockfile: LockfileConfig::default(),
            stale: StaleConfig::default(),
        }
    }
}

impl Config {
    pub fn pack_meta(&self) -> PackMeta {
        PackMeta::new(self.pack.id.clone(), self.pack.version.clone())
    }

    /// Knobs for one exporter; `Null` when none are configured.
    pub fn exporter_knobs(&self, name: &str) -> Value {
        self.exporter_config.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Configured scopes as domain [`Scope`]s, always starting with the root.
    pub fn resolved_scopes(&self) -> Result<Vec<Scope>, CoreError> {
        let mut scopes = vec![Scope::root()];
        for sc in &self.scopes {
            let path = normalize_scope_path(&sc.path)?;
            if path.is_empty() {
                return Err(CoreError::Config {
                    message: "scope path must not be the project root".to_string(),
                });
            }
            let name = sc.name.clone().unwrap_or_else(|| path.clone());
            if scopes.iter().any(|s| s.name == name || s.path == path) {
                return Err(CoreError::Config {
                    message: format!("duplicate scope '{name}' ({path})"),
                });
            }
            scopes.push(Scope {
                name,
                path,
                patterns: sc.rules.clone(),
            });
        }
        Ok(scopes)
    }

    // -----------------------------------------------------------------------
    // 3. Load / save
    // -----------------------------------------------------------------------

    /// Load `<root>/.ruleforge/config.yaml`.
    pub fn load_at(root: &Path) -> Result<Config, CoreError> {
        let path = config_path_at(root);
        if !path.exists() {
            return Err(CoreError::ConfigNotFound { path });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
    }

    /// Atomically save to `<root>/.ruleforge/config.yaml`.
    ///
    /// `.tmp` is always in the same directory as the target.
    pub fn save_at(&self, root: &Path) -> Result<(), CoreError> {
        let dir = config_dir_at(root);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let path = config_path_at(root);
        let tmp = path.with_file_name("config.yaml.tmp");
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }
}

fn normalize_scope_path(raw: &str) -> Result<String, CoreError> {
    relative_path(raw).map_err(|reason| CoreError::Config {
        message: format!("scope path '{raw}' {reason}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
