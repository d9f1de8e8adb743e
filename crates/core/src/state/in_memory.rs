//! # In-Memory Progress Repository
//!
//! Process-local repository for ephemeral servers and tests. Nothing survives
//! a restart.

use super::progress::{ProgressRecord, ProgressRepository};
use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryProgressRepository {
    records: RwLock<HashMap<(String, String), ProgressRecord>>,
}

impl InMemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProgressRepository for InMemoryProgressRepository {
    fn find(&self, user: &str, conversation_id: &str) -> Result<Option<ProgressRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        Ok(records
            .get(&(user.to_string(), conversation_id.to_string()))
            .cloned())
    }

    fn upsert(
        &self,
        user: &str,
        conversation_id: &str,
        skill_tree_data: Value,
    ) -> Result<ProgressRecord> {
        let record = ProgressRecord {
            user: user.to_string(),
            conversation_id: conversation_id.to_string(),
            skill_tree_data,
            last_updated: Utc::now(),
        };

        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        records.insert(
            (user.to_string(), conversation_id.to_string()),
            record.clone(),
        );

        Ok(record)
    }
}
