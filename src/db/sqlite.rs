use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::{debug, warn};

use crate::db::schema_sqlite::{channels, messages};
use crate::fingerprint::ContentHash;

use super::{
    DatabaseError,
    models::{ActiveChannels, ChannelRecord, MessageRecord, StoredState},
    stores::{CycleTransaction, SyncStore},
};

/// Keeps `IN (...)` lists well under SQLite's bound-parameter limit.
const HASH_QUERY_CHUNK: usize = 500;

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_err(e: diesel::result::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channels)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct DbChannel {
    id: i64,
    username: String,
}

#[derive(Insertable)]
#[diesel(table_name = channels)]
struct NewChannel<'a> {
    id: i64,
    username: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
struct NewMessage<'a> {
    sequence_id: i64,
    group_id: Option<i64>,
    channel_id: i64,
    content_hash: &'a [u8],
    created_at: String,
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn = SqliteConnection::establish(path)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

/// Frees `username` if a different channel still holds it, so a rename or a
/// recycled handle does not trip the unique constraint. The previous holder
/// keeps its id and history under the placeholder `#<id>`.
fn release_username(
    conn: &mut SqliteConnection,
    username: &str,
    owner_id: i64,
    now: &str,
) -> Result<(), DatabaseError> {
    let holders: Vec<i64> = channels::table
        .filter(channels::username.eq(username))
        .filter(channels::id.ne(owner_id))
        .select(channels::id)
        .load(conn)
        .map_err(query_err)?;

    for holder in holders {
        warn!(
            "username @{} moved from channel {} to channel {}; releasing it from {}",
            username, holder, owner_id, holder
        );
        diesel::update(channels::table.filter(channels::id.eq(holder)))
            .set((
                channels::username.eq(format!("#{holder}")),
                channels::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(query_err)?;
    }
    Ok(())
}

pub struct SqliteSyncStore {
    db_path: Arc<String>,
}

impl SqliteSyncStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn begin(&self) -> Result<Box<dyn CycleTransaction>, DatabaseError> {
        let db_path = self.db_path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.batch_execute("BEGIN IMMEDIATE")
                .map_err(|e| DatabaseError::Transaction(e.to_string()))?;
            Ok::<_, DatabaseError>(conn)
        })
        .await
        .map_err(|e| DatabaseError::Transaction(format!("database task failed: {e}")))??;

        Ok(Box::new(SqliteCycleTransaction { conn: Some(conn) }))
    }
}

/// An open `BEGIN IMMEDIATE` transaction on a dedicated connection. The
/// connection is moved onto the blocking pool for each statement and back.
pub struct SqliteCycleTransaction {
    conn: Option<SqliteConnection>,
}

impl SqliteCycleTransaction {
    async fn run<T, F>(&mut self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::Transaction("transaction already finished".into()))?;

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?;

        self.conn = Some(conn);
        result
    }

    async fn finish(mut self: Box<Self>, statement: &'static str) -> Result<(), DatabaseError> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::Transaction("transaction already finished".into()))?;

        tokio::task::spawn_blocking(move || {
            conn.batch_execute(statement)
                .map_err(|e| DatabaseError::Transaction(format!("{statement}: {e}")))
        })
        .await
        .map_err(|e| DatabaseError::Transaction(format!("database task failed: {e}")))?
    }
}

impl Drop for SqliteCycleTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        debug!("rolling back unfinished sync transaction");
        // Inside a runtime the rollback must not stall a worker thread.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || rollback_unfinished(conn));
            }
            Err(_) => rollback_unfinished(conn),
        }
    }
}

fn rollback_unfinished(mut conn: SqliteConnection) {
    if let Err(e) = conn.batch_execute("ROLLBACK") {
        warn!("rollback of unfinished sync transaction failed: {}", e);
    }
}

#[async_trait]
impl CycleTransaction for SqliteCycleTransaction {
    async fn load_state(&mut self, active: &ActiveChannels) -> Result<StoredState, DatabaseError> {
        if active.usernames.is_empty() && active.ids.is_empty() {
            return Ok(StoredState::default());
        }

        let usernames: Vec<String> = active.usernames.iter().cloned().collect();
        let ids: Vec<i64> = active.ids.iter().copied().collect();

        self.run(move |conn| {
            let rows = channels::table
                .filter(channels::username.eq_any(usernames).or(channels::id.eq_any(ids)))
                .select(DbChannel::as_select())
                .load::<DbChannel>(conn)
                .map_err(query_err)?;

            if rows.is_empty() {
                return Ok(StoredState::default());
            }

            let channel_ids: Vec<i64> = rows.iter().map(|c| c.id).collect();
            let maxima: Vec<(i64, Option<i64>)> = messages::table
                .filter(messages::channel_id.eq_any(channel_ids))
                .group_by(messages::channel_id)
                .select((messages::channel_id, max(messages::sequence_id)))
                .load(conn)
                .map_err(query_err)?;

            let max_seen: HashMap<i64, i64> = maxima
                .into_iter()
                .filter_map(|(channel_id, seen)| seen.map(|seen| (channel_id, seen)))
                .collect();

            let channels = rows
                .into_iter()
                .map(|row| ChannelRecord {
                    cursor: max_seen.get(&row.id).copied().unwrap_or(0),
                    id: row.id,
                    username: row.username,
                })
                .collect();

            Ok(StoredState { channels, max_seen })
        })
        .await
    }

    async fn posted_hashes(
        &mut self,
        hashes: &[ContentHash],
    ) -> Result<HashSet<ContentHash>, DatabaseError> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }

        let wanted: Vec<Vec<u8>> = hashes.iter().map(|h| h.as_bytes().to_vec()).collect();
        self.run(move |conn| {
            let mut found = HashSet::new();
            for chunk in wanted.chunks(HASH_QUERY_CHUNK) {
                let rows: Vec<Vec<u8>> = messages::table
                    .filter(messages::content_hash.eq_any(chunk.to_vec()))
                    .select(messages::content_hash)
                    .distinct()
                    .load(conn)
                    .map_err(query_err)?;
                found.extend(rows.iter().filter_map(|row| ContentHash::from_slice(row)));
            }
            Ok(found)
        })
        .await
    }

    async fn save_channels(&mut self, records: &[ChannelRecord]) -> Result<(), DatabaseError> {
        if records.is_empty() {
            return Ok(());
        }

        let records = records.to_vec();
        self.run(move |conn| {
            let now = datetime_to_string(&Utc::now());
            for record in &records {
                release_username(conn, &record.username, record.id, &now)?;
                debug!("saving channel {} (@{})", record.id, record.username);
                diesel::insert_into(channels::table)
                    .values(NewChannel {
                        id: record.id,
                        username: &record.username,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    })
                    .execute(conn)
                    .map_err(query_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn rename_channels(&mut self, records: &[ChannelRecord]) -> Result<(), DatabaseError> {
        if records.is_empty() {
            return Ok(());
        }

        let records = records.to_vec();
        self.run(move |conn| {
            let now = datetime_to_string(&Utc::now());
            for record in &records {
                release_username(conn, &record.username, record.id, &now)?;
                diesel::update(channels::table.filter(channels::id.eq(record.id)))
                    .set((
                        channels::username.eq(&record.username),
                        channels::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .map_err(query_err)?;
            }
            Ok(())
        })
        .await
    }

    async fn save_messages(&mut self, records: &[MessageRecord]) -> Result<usize, DatabaseError> {
        if records.is_empty() {
            return Ok(0);
        }

        let records = records.to_vec();
        self.run(move |conn| {
            let now = datetime_to_string(&Utc::now());
            let mut inserted = 0;
            for record in &records {
                inserted += diesel::insert_or_ignore_into(messages::table)
                    .values(NewMessage {
                        sequence_id: record.sequence_id,
                        group_id: record.group_id,
                        channel_id: record.channel_id,
                        content_hash: record.content_hash.as_bytes(),
                        created_at: now.clone(),
                    })
                    .execute(conn)
                    .map_err(query_err)?;
            }
            Ok(inserted)
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.finish("ROLLBACK").await
    }
}

pub(crate) fn count_rows(path: &str) -> Result<(i64, i64), DatabaseError> {
    let mut conn = establish_connection(path)?;
    let channel_count = channels::table
        .count()
        .get_result(&mut conn)
        .map_err(query_err)?;
    let message_count = messages::table
        .count()
        .get_result(&mut conn)
        .map_err(query_err)?;
    Ok((channel_count, message_count))
}
