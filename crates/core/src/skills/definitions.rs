//! # Skill Definition Store
//!
//! Holds the canonical default skill tree served to users who have no saved
//! progress yet. The tree is a JSON artifact: either the one shipped with the
//! crate or a file supplied through configuration.

use super::node::{parse_tree, SkillNode};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// The tree shipped with the crate
const BUILTIN_TREE: &str = include_str!("../../assets/default_skill_tree.json");

/// Immutable canonical skill tree, cheap to clone and share across requests
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    /// The tree exactly as served to clients
    tree: Arc<Value>,
    nodes: Arc<[SkillNode]>,
}

impl DefinitionStore {
    /// Load the built-in default tree
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TREE).context("Built-in skill tree is malformed")
    }

    /// Load a tree from a JSON file containing a flat node list
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read skill tree {}", path.display()))?;
        let store = Self::from_json(&content)
            .with_context(|| format!("Failed to parse skill tree {}", path.display()))?;

        tracing::info!(path = %path.display(), nodes = store.len(), "Loaded skill tree definition");
        Ok(store)
    }

    /// Parse a flat node list from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    /// Wrap a flat node list; it must contain at least one usable node
    pub fn from_value(tree: Value) -> Result<Self> {
        let nodes = parse_tree(&tree);
        if nodes.is_empty() {
            anyhow::bail!("Skill tree definition contains no nodes");
        }
        Ok(Self {
            tree: Arc::new(tree),
            nodes: nodes.into(),
        })
    }

    pub fn from_nodes(nodes: Vec<SkillNode>) -> Result<Self> {
        Self::from_value(serde_json::to_value(nodes)?)
    }

    /// Load from `path` when given, otherwise the built-in tree
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    /// The default tree as JSON, ready to hand out
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn nodes(&self) -> &[SkillNode] {
        &self.nodes
    }

    /// Id of the first node, which roots the default tree
    pub fn root_id(&self) -> Option<&str> {
        self.nodes.first().map(|n| n.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
