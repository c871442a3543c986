use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::{counter_to_i64, LogRecord, StoredRecord};
use crate::store::RecordStore;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Initialize database connection pool with recommended pragmas.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(include_str!("../migrations/001_create_occupancy_log.sql"))
        .execute(pool)
        .await?;
    Ok(())
}

/// Append one record to the occupancy log. Returns the new row id.
pub async fn insert_record(pool: &SqlitePool, record: &LogRecord) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO occupancy_log (ts, device_id, kind, entered_total, exited_total, occupancy)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.timestamp.format(TS_FORMAT).to_string())
    .bind(&record.device_id)
    .bind(record.kind.as_str())
    .bind(counter_to_i64(record.entered_total))
    .bind(counter_to_i64(record.exited_total))
    .bind(record.occupancy)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Maximum allowed limit for pagination.
pub const MAX_LIMIT: i64 = 1000;

/// Get log entries after a given id.
pub async fn get_log_after(
    pool: &SqlitePool,
    after_id: i64,
    limit: i64,
) -> Result<(Vec<StoredRecord>, i64, bool), sqlx::Error> {
    let limit = limit.clamp(1, MAX_LIMIT);

    let entries = sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT id, ts, device_id, kind, entered_total, exited_total, occupancy
        FROM occupancy_log
        WHERE id > ?
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(after_id)
    .bind(limit + 1) // Fetch one extra to check if there's more
    .fetch_all(pool)
    .await?;

    let has_more = entries.len() > limit as usize;
    let entries: Vec<StoredRecord> = entries.into_iter().take(limit as usize).collect();

    let max_id = entries.last().map(|r| r.id).unwrap_or(after_id);

    Ok((entries, max_id, has_more))
}

/// SQLite-backed [`RecordStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl RecordStore for SqliteStore {
    async fn record(&self, record: &LogRecord) -> Result<(), StoreError> {
        insert_record(&self.pool, record).await?;
        Ok(())
    }
}
