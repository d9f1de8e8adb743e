//! # Configuration
//!
//! Settings persisted at `.skilltree/config.json`. Every field has a default,
//! so a missing file or a partial file is fine.

use crate::layout::LayoutConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = ".skilltree/config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkillTreeConfig {
    /// SQLite database location
    pub database_path: PathBuf,
    /// JSON file with the default tree; the built-in tree when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tree_path: Option<PathBuf>,
    /// Node the layout grows from
    pub root_id: String,
    pub layout: LayoutConfig,
}

impl Default for SkillTreeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(crate::state::db::DEFAULT_DB_PATH),
            default_tree_path: None,
            root_id: "orientasi".to_string(),
            layout: LayoutConfig::default(),
        }
    }
}

impl SkillTreeConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}
