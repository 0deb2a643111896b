//! Record persistence.

use crate::records::SyncRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use syncline_core::SyncError;

/// The "save record" seam the orchestrator persists through.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, record: &SyncRecord) -> Result<(), SyncError>;
}

/// SQLite-backed store. Records are upserted by id with the raw payload
/// and the time they were synced.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects and bootstraps the schema. `sqlite::memory:` works for
    /// ephemeral runs; file databases use `sqlite://path?mode=rwc`.
    pub async fn connect(database_url: &str) -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                synced_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// Number of stored records; used by tests and the run summary.
    pub async fn count(&self) -> Result<i64, SyncError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn save(&self, record: &SyncRecord) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO records (id, payload, synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                synced_at = excluded.synced_at",
        )
        .bind(&record.id)
        .bind(record.payload.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> SyncError {
    SyncError::DatabaseFailure {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> SyncRecord {
        serde_json::from_value(serde_json::json!({"id": id, "name": "test"})).unwrap()
    }

    #[tokio::test]
    async fn save_inserts_and_upserts() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();

        store.save(&record("rec-1")).await.unwrap();
        store.save(&record("rec-2")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        // Saving the same id again replaces, not duplicates.
        store.save(&record("rec-1")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bad_database_url_is_a_database_failure() {
        let err = SqliteStore::connect("sqlite:///nonexistent-dir/db.sqlite")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DatabaseFailure { .. }));
    }
}
