//! libSQL backend: `CheckpointStore` and `ProfileStore` implementations.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    CheckpointStore, Namespace, ProfileEntry, ProfileFilter, ProfileStore, ProfileType,
};
use crate::workflow::Checkpoint;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Run all pending schema migrations.
    pub async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_profile_entry(row: &libsql::Row) -> Result<ProfileEntry, DatabaseError> {
    let column = |e: libsql::Error| DatabaseError::Query(format!("profile row: {e}"));
    let type_str: String = row.get(1).map_err(column)?;
    let created_str: String = row.get(3).map_err(column)?;
    Ok(ProfileEntry {
        key: row.get(0).map_err(column)?,
        profile_type: type_str
            .parse::<ProfileType>()
            .map_err(DatabaseError::Serialization)?,
        content: row.get(2).map_err(column)?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Checkpoints ─────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for LibSqlBackend {
    async fn save(&self, thread_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(checkpoint)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO checkpoints (thread_id, position, step, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (thread_id) DO UPDATE SET
                    position = ?2, step = ?3, payload = ?4, updated_at = ?5",
                params![
                    thread_id,
                    checkpoint.position.clone(),
                    checkpoint.step as i64,
                    payload,
                    checkpoint.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_checkpoint: {e}")))?;

        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT payload FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_checkpoint: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let payload: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_checkpoint: {e}")))?;
                let checkpoint = serde_json::from_str(&payload)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(Some(checkpoint))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_checkpoint: {e}"))),
        }
    }
}

// ── Profile entries ─────────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn put(&self, namespace: &Namespace, entry: &ProfileEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO profile_entries (user_id, scope, key, profile_type, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id, scope, key) DO UPDATE SET
                    profile_type = ?4, content = ?5",
                params![
                    namespace.user_id.as_str(),
                    namespace.scope.as_str(),
                    entry.key.as_str(),
                    entry.profile_type.as_str(),
                    entry.content.as_str(),
                    entry.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_profile_entry: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        filter: &ProfileFilter,
    ) -> Result<Vec<ProfileEntry>, DatabaseError> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let type_filter = filter.profile_type.map(|t| t.as_str().to_string());

        let mut rows = self
            .conn()
            .query(
                "SELECT key, profile_type, content, created_at FROM profile_entries
                 WHERE user_id = ?1 AND scope = ?2
                   AND (?3 IS NULL OR profile_type = ?3)
                 ORDER BY seq ASC
                 LIMIT ?4",
                params![
                    namespace.user_id.as_str(),
                    namespace.scope.as_str(),
                    type_filter,
                    limit
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("search_profile_entries: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("search_profile_entries: {e}")))?
        {
            entries.push(row_to_profile_entry(&row)?);
        }
        Ok(entries)
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM profile_entries WHERE user_id = ?1 AND scope = ?2 AND key = ?3",
                params![namespace.user_id.as_str(), namespace.scope.as_str(), key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_profile_entry: {e}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Interrupt;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn entry(key: &str, profile_type: ProfileType, content: &str) -> ProfileEntry {
        ProfileEntry {
            key: key.to_string(),
            profile_type,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    // ── Checkpoint tests ────────────────────────────────────────────

    #[tokio::test]
    async fn checkpoint_round_trip() {
        let db = test_db().await;
        let mut checkpoint = Checkpoint::new(serde_json::json!({"input": "topic", "plan": []}));
        checkpoint.advance(
            serde_json::json!({"input": "topic", "plan": [{"title": "Intro"}], "n": 1.5}),
            Some("disclose".into()),
            Some(Interrupt::decision(
                "disclose",
                "Ready for more?",
                serde_json::json!({"title": "Intro", "content": "..."}),
            )),
        );

        db.save("thread-1", &checkpoint).await.unwrap();
        let loaded = db.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn checkpoint_save_overwrites() {
        let db = test_db().await;
        let mut checkpoint = Checkpoint::new(serde_json::json!({"v": 1}));
        db.save("t", &checkpoint).await.unwrap();

        checkpoint.advance(serde_json::json!({"v": 2}), None, None);
        db.save("t", &checkpoint).await.unwrap();

        let loaded = db.load("t").await.unwrap().unwrap();
        assert_eq!(loaded.state["v"], 2);
        assert_eq!(loaded.history.len(), 1);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let db = test_db().await;
        assert!(db.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoints_are_per_thread() {
        let db = test_db().await;
        db.save("a", &Checkpoint::new(serde_json::json!("A"))).await.unwrap();
        db.save("a/learning", &Checkpoint::new(serde_json::json!("L"))).await.unwrap();

        assert_eq!(db.load("a").await.unwrap().unwrap().state, "A");
        assert_eq!(db.load("a/learning").await.unwrap().unwrap().state, "L");
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn profile_search_filters_by_type_in_insertion_order() {
        let db = test_db().await;
        let ns = Namespace::profile("u1");
        db.put(&ns, &entry("k1", ProfileType::Interests, "chess")).await.unwrap();
        db.put(&ns, &entry("k2", ProfileType::Name, "Ada")).await.unwrap();
        db.put(&ns, &entry("k3", ProfileType::Interests, "hiking")).await.unwrap();

        let interests = db
            .search(&ns, &ProfileFilter::of_type(ProfileType::Interests))
            .await
            .unwrap();
        let contents: Vec<_> = interests.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["chess", "hiking"]);

        let all = db.search(&ns, &ProfileFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn profile_search_respects_limit() {
        let db = test_db().await;
        let ns = Namespace::profile("u1");
        for i in 0..7 {
            db.put(&ns, &entry(&format!("k{i}"), ProfileType::Goals, &format!("goal {i}")))
                .await
                .unwrap();
        }
        let limited = db
            .search(&ns, &ProfileFilter::of_type(ProfileType::Goals).with_limit(5))
            .await
            .unwrap();
        assert_eq!(limited.len(), 5);
        assert_eq!(limited[0].content, "goal 0");
    }

    #[tokio::test]
    async fn profile_namespaces_are_isolated() {
        let db = test_db().await;
        db.put(&Namespace::profile("u1"), &entry("k", ProfileType::Name, "Ada"))
            .await
            .unwrap();

        let other = db
            .search(&Namespace::profile("u2"), &ProfileFilter::default())
            .await
            .unwrap();
        assert!(other.is_empty());
        assert!(!db.delete(&Namespace::profile("u2"), "k").await.unwrap());
    }

    #[tokio::test]
    async fn profile_delete_reports_removal() {
        let db = test_db().await;
        let ns = Namespace::profile("u1");
        db.put(&ns, &entry("k", ProfileType::Name, "Ada")).await.unwrap();

        assert!(db.delete(&ns, "k").await.unwrap());
        assert!(!db.delete(&ns, "k").await.unwrap());
        assert!(db.search(&ns, &ProfileFilter::default()).await.unwrap().is_empty());
    }
}
