// config.rs - Stride configuration.
//
// StrideConfig determines where Stride keeps its state and who may do what.
// It is read from `<project>/.stride/config.toml`; every field has a default,
// so a missing file means "standard `.stride/` layout, empty roster".
// Relative paths in the file are resolved against the project root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stride_policy::DEFAULT_PROFILE;
use stride_proposal::DEFAULT_APPLY_ATTEMPTS;

use crate::error::GatewayError;

const STRIDE_DIR: &str = ".stride";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrideConfig {
    /// SQLite database holding drafts, proposals, policy and audit.
    #[serde(default)]
    pub database: PathBuf,

    /// Default destination for `audit export`.
    #[serde(default)]
    pub audit_export: PathBuf,

    /// Policy profile for drafts that do not name one.
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Apply attempts when the draft plan moves concurrently.
    #[serde(default = "default_apply_attempts")]
    pub apply_attempts: u32,

    /// Coach id → athlete ids the coach may plan for.
    #[serde(default)]
    pub roster: BTreeMap<String, Vec<String>>,

    /// Principal ids with administrator rights.
    #[serde(default)]
    pub admins: Vec<String>,

    #[serde(default)]
    pub cost: CostConfig,
}

/// Cost telemetry settings. No rate means no estimates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostConfig {
    #[serde(default)]
    pub hourly_rate: Option<f64>,

    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            hourly_rate: None,
            currency: default_currency(),
        }
    }
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_apply_attempts() -> u32 {
    DEFAULT_APPLY_ATTEMPTS
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::new(),
            audit_export: PathBuf::new(),
            default_profile: default_profile(),
            apply_attempts: default_apply_attempts(),
            roster: BTreeMap::new(),
            admins: Vec::new(),
            cost: CostConfig::default(),
        }
    }
}

impl StrideConfig {
    /// Create a config with the standard `.stride/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.resolve(project_root.as_ref());
        config
    }

    /// Where the config file for `project_root` lives.
    pub fn config_path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(STRIDE_DIR).join("config.toml")
    }

    /// Parse a config file. Paths are left as written.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GatewayError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load the project's config file (or defaults if there is none) and
    /// resolve its paths against `project_root`.
    pub fn load_for_project(project_root: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let root = project_root.as_ref();
        let path = Self::config_path(root);
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.resolve(root);
        Ok(config)
    }

    /// Like [`load_for_project`](Self::load_for_project), falling back to the
    /// standard layout when the file is unreadable.
    pub fn load_or_default(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref();
        Self::load_for_project(root).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable config, using defaults");
            Self::for_project(root)
        })
    }

    fn resolve(&mut self, root: &Path) {
        let stride_dir = root.join(STRIDE_DIR);
        self.database = resolve_path(&self.database, root, || stride_dir.join("stride.db"));
        self.audit_export =
            resolve_path(&self.audit_export, root, || stride_dir.join("audit.jsonl"));
    }
}

fn resolve_path(path: &Path, root: &Path, default: impl FnOnce() -> PathBuf) -> PathBuf {
    if path.as_os_str().is_empty() {
        default()
    } else if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}
