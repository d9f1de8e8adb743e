//! # Progress Repository
//!
//! Durable storage for per-conversation skill progress. One row per
//! (user, conversation) pair; writes are single-statement upserts, so
//! concurrent writers to the same key resolve last-write-wins.

use super::db::SkillTreeDb;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Last saved skill tree for one user in one conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub user: String,
    pub conversation_id: String,
    /// Flat node list, stored as submitted
    pub skill_tree_data: Value,
    pub last_updated: DateTime<Utc>,
}

/// Storage keyed by (user, conversation)
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for a key, if one was ever written
    fn find(&self, user: &str, conversation_id: &str) -> Result<Option<ProgressRecord>>;

    /// Create or fully replace the record for a key, refreshing its timestamp
    fn upsert(
        &self,
        user: &str,
        conversation_id: &str,
        skill_tree_data: Value,
    ) -> Result<ProgressRecord>;
}

/// SQLite-backed progress repository
pub struct SqliteProgressRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProgressRepository {
    /// Create from shared SkillTreeDb connection
    pub fn new(db: &SkillTreeDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM skill_progress", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

impl ProgressRepository for SqliteProgressRepository {
    fn find(&self, user: &str, conversation_id: &str) -> Result<Option<ProgressRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let row: Option<(String, String)> = conn
            .query_row(
                r#"
                SELECT skill_tree_data, last_updated
                FROM skill_progress WHERE user_id = ?1 AND conversation_id = ?2
                "#,
                params![user, conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query skill progress")?;

        let Some((data, last_updated)) = row else {
            return Ok(None);
        };

        let skill_tree_data: Value = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt skill tree for conversation {}", conversation_id))?;
        let last_updated = DateTime::parse_from_rfc3339(&last_updated)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("Corrupt timestamp for conversation {}", conversation_id))?;

        Ok(Some(ProgressRecord {
            user: user.to_string(),
            conversation_id: conversation_id.to_string(),
            skill_tree_data,
            last_updated,
        }))
    }

    fn upsert(
        &self,
        user: &str,
        conversation_id: &str,
        skill_tree_data: Value,
    ) -> Result<ProgressRecord> {
        let data = serde_json::to_string(&skill_tree_data)?;
        let last_updated = Utc::now();

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO skill_progress (user_id, conversation_id, skill_tree_data, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, conversation_id) DO UPDATE SET
                skill_tree_data = excluded.skill_tree_data,
                last_updated = excluded.last_updated
            "#,
            params![user, conversation_id, data, last_updated.to_rfc3339()],
        )
        .context("Failed to upsert skill progress")?;

        tracing::debug!(
            user = %user,
            conversation_id = %conversation_id,
            nodes = skill_tree_data.as_array().map_or(0, Vec::len),
            "Upserted skill progress"
        );

        Ok(ProgressRecord {
            user: user.to_string(),
            conversation_id: conversation_id.to_string(),
            skill_tree_data,
            last_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn repo() -> SqliteProgressRepository {
        SqliteProgressRepository::new(&SkillTreeDb::open_in_memory().unwrap())
    }

    fn tree(ids: &[&str]) -> Value {
        ids.iter().map(|id| json!({ "id": id, "name": id })).collect()
    }

    #[test]
    fn test_find_missing_is_none() {
        assert!(repo().find("u1", "c1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_creates_then_replaces() {
        let repo = repo();

        let created = repo.upsert("u1", "c1", tree(&["a", "b"])).unwrap();
        assert_eq!(created.skill_tree_data, tree(&["a", "b"]));

        let replaced = repo.upsert("u1", "c1", tree(&["z"])).unwrap();
        assert!(replaced.last_updated >= created.last_updated);

        let stored = repo.find("u1", "c1").unwrap().unwrap();
        assert_eq!(stored.skill_tree_data, tree(&["z"]));
        assert_eq!(stored.last_updated, replaced.last_updated);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let repo = repo();
        repo.upsert("u1", "c1", tree(&["a"])).unwrap();
        repo.upsert("u1", "c2", tree(&["b"])).unwrap();
        repo.upsert("u2", "c1", tree(&["c"])).unwrap();

        assert_eq!(repo.count().unwrap(), 3);
        assert_eq!(
            repo.find("u2", "c1").unwrap().unwrap().skill_tree_data,
            tree(&["c"])
        );
        assert!(repo.find("u2", "c2").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.db");

        {
            let db = SkillTreeDb::open_at(&path).unwrap();
            SqliteProgressRepository::new(&db)
                .upsert("u1", "c1", sparse_tree())
                .unwrap();
        }

        let db = SkillTreeDb::open_at(&path).unwrap();
        let record = SqliteProgressRepository::new(&db)
            .find("u1", "c1")
            .unwrap()
            .unwrap();
        assert_eq!(record.skill_tree_data, sparse_tree());
    }

    fn sparse_tree() -> Value {
        json!([
            { "id": "root", "unlocked": true, "children": ["leaf"], "icon": "flag" },
            { "id": "leaf", "description": "extra keys survive" }
        ])
    }

    #[test]
    fn test_tree_is_stored_verbatim() {
        let repo = repo();
        let malformed = json!([{ "name": "no id" }, { "id": 7, "children": "x" }]);

        repo.upsert("u1", "c1", sparse_tree()).unwrap();
        repo.upsert("u1", "c2", malformed.clone()).unwrap();
        repo.upsert("u1", "c3", json!({ "not": "a list" })).unwrap();

        assert_eq!(repo.find("u1", "c1").unwrap().unwrap().skill_tree_data, sparse_tree());
        assert_eq!(repo.find("u1", "c2").unwrap().unwrap().skill_tree_data, malformed);
        assert_eq!(
            repo.find("u1", "c3").unwrap().unwrap().skill_tree_data,
            json!({ "not": "a list" })
        );
    }

    #[test]
    fn test_concurrent_upserts_keep_one_record() {
        let repo = Arc::new(repo());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                thread::spawn(move || {
                    let id = format!("n{}", i);
                    repo.upsert("u1", "c1", tree(&[id.as_str()])).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(repo.count().unwrap(), 1);
        let stored = repo.find("u1", "c1").unwrap().unwrap();
        assert_eq!(stored.skill_tree_data.as_array().unwrap().len(), 1);
        assert!(stored.skill_tree_data[0]["id"]
            .as_str()
            .unwrap()
            .starts_with('n'));
    }

    #[test]
    fn test_record_wire_shape() {
        let record = ProgressRecord {
            user: "u1".into(),
            conversation_id: "c1".into(),
            skill_tree_data: json!([]),
            last_updated: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("conversationId").is_some());
        assert!(json.get("skillTreeData").is_some());
        assert!(json.get("lastUpdated").is_some());
    }
}
