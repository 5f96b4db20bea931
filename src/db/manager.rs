use crate::config::DatabaseConfig;
use crate::db::{DatabaseError, SyncStore};
use std::sync::Arc;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteSyncStore, count_rows, establish_connection};
#[cfg(feature = "sqlite")]
use diesel::RunQueryDsl;

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: String,
    sync_store: Arc<dyn SyncStore>,
}

impl DatabaseManager {
    #[cfg(feature = "sqlite")]
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config.sqlite_path().ok_or_else(|| {
            DatabaseError::Connection("no sqlite database path configured".to_string())
        })?;
        let sync_store = Arc::new(SqliteSyncStore::new(Arc::new(path.clone())));

        Ok(Self {
            sqlite_path: path,
            sync_store,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    pub async fn new(_config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Err(DatabaseError::Connection(
            "SQLite feature not enabled".to_string(),
        ))
    }

    #[cfg(feature = "sqlite")]
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS channels (
                    id INTEGER PRIMARY KEY NOT NULL,
                    username TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sequence_id BIGINT NOT NULL,
                    group_id BIGINT,
                    channel_id BIGINT NOT NULL REFERENCES channels(id),
                    content_hash BLOB NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (sequence_id, channel_id)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_messages_content_hash ON messages(content_hash)",
                "CREATE INDEX IF NOT EXISTS idx_messages_channel_id ON messages(channel_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(not(feature = "sqlite"))]
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::Migration(
            "SQLite feature not enabled".to_string(),
        ))
    }

    /// `(channels, messages)` row counts, outside any cycle transaction.
    #[cfg(feature = "sqlite")]
    pub async fn counts(&self) -> Result<(i64, i64), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || count_rows(&path))
            .await
            .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    pub fn sync_store(&self) -> Arc<dyn SyncStore> {
        self.sync_store.clone()
    }

    pub fn path(&self) -> &str {
        &self.sqlite_path
    }
}
