//! # Reconciliation Service
//!
//! Answers "which tree should this user see in this conversation" and records
//! progress updates.
//!
//! ```text
//! get_progress ──► repository.find ──► non-empty record ─► database_record
//!                                  └─► absent / empty ───► default tree
//!                                                           (never written)
//! update_progress ──► strip positions ──► repository.upsert (full replacement)
//! ```
//!
//! Trees are never validated here. Whatever JSON the client sends is stored
//! and handed back; the layout engine copes with malformed trees at read time.

use crate::skills::{strip_positions, DefinitionStore};
use crate::state::{ProgressRecord, ProgressRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failures surfaced to callers of the service
#[derive(Debug, Error)]
pub enum ProgressError {
    /// No authenticated user identity was supplied
    #[error("user identity is required")]
    Unauthenticated,
    /// A required input was missing
    #[error("{0}")]
    Validation(String),
    /// The repository failed; details are for logs only
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Where a served tree came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressSource {
    #[serde(rename = "database_record")]
    Persisted,
    #[serde(rename = "backend_default_template")]
    Default,
}

/// A record together with where it came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciledProgress {
    #[serde(flatten)]
    pub record: ProgressRecord,
    pub source: ProgressSource,
}

/// Combines the progress repository with the canonical default tree
#[derive(Clone)]
pub struct ReconciliationService {
    repository: Arc<dyn ProgressRepository>,
    definitions: DefinitionStore,
}

impl ReconciliationService {
    pub fn new(repository: Arc<dyn ProgressRepository>, definitions: DefinitionStore) -> Self {
        Self {
            repository,
            definitions,
        }
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    /// Serve saved progress, or the default tree when nothing usable is stored.
    ///
    /// A stored record with an empty tree is served as the default, so an
    /// empty write is indistinguishable from no write at all.
    pub fn get_progress(
        &self,
        user: &str,
        conversation_id: Option<&str>,
    ) -> Result<ReconciledProgress, ProgressError> {
        require_user(user)?;
        let conversation_id = require_conversation(conversation_id)?;

        tracing::debug!(user = %user, conversation_id = %conversation_id, "Fetching skill progress");

        let stored = self
            .repository
            .find(user, conversation_id)
            .map_err(|e| {
                tracing::error!(
                    user = %user,
                    conversation_id = %conversation_id,
                    "Failed to read skill progress: {:#}",
                    e
                );
                ProgressError::Storage(e)
            })?;

        match stored {
            Some(record) if !is_blank(&record.skill_tree_data) => {
                tracing::debug!("Found stored progress");
                Ok(ReconciledProgress {
                    record,
                    source: ProgressSource::Persisted,
                })
            }
            _ => {
                tracing::debug!("No stored progress (or empty), serving default tree");
                Ok(ReconciledProgress {
                    record: ProgressRecord {
                        user: user.to_string(),
                        conversation_id: conversation_id.to_string(),
                        skill_tree_data: self.definitions.tree().clone(),
                        last_updated: Utc::now(),
                    },
                    source: ProgressSource::Default,
                })
            }
        }
    }

    /// Replace the stored tree for (user, conversation).
    ///
    /// The tree is stored as given apart from computed `position` keys. Only a
    /// missing or null tree is rejected.
    pub fn update_progress(
        &self,
        user: &str,
        conversation_id: Option<&str>,
        skill_tree_data: Option<Value>,
    ) -> Result<ProgressRecord, ProgressError> {
        require_user(user)?;
        let conversation_id = require_conversation(conversation_id)?;
        let mut skill_tree_data = match skill_tree_data {
            None | Some(Value::Null) => {
                return Err(ProgressError::Validation(
                    "skillTreeData is required".to_string(),
                ))
            }
            Some(tree) => tree,
        };
        strip_positions(&mut skill_tree_data);

        let nodes = skill_tree_data.as_array().map_or(0, Vec::len);
        let record = self
            .repository
            .upsert(user, conversation_id, skill_tree_data)
            .map_err(|e| {
                tracing::error!(
                    user = %user,
                    conversation_id = %conversation_id,
                    "Failed to update skill progress: {:#}",
                    e
                );
                ProgressError::Storage(e)
            })?;

        tracing::info!(user = %user, conversation_id = %conversation_id, nodes, "Skill progress saved");
        Ok(record)
    }
}

/// An empty list reads the same as nothing stored
fn is_blank(tree: &Value) -> bool {
    match tree {
        Value::Array(nodes) => nodes.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn require_user(user: &str) -> Result<(), ProgressError> {
    if user.is_empty() {
        return Err(ProgressError::Unauthenticated);
    }
    Ok(())
}

fn require_conversation(conversation_id: Option<&str>) -> Result<&str, ProgressError> {
    match conversation_id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ProgressError::Validation(
            "conversationId is required".to_string(),
        )),
    }
}
