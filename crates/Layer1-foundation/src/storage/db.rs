//! SQLite Event Log
//!
//! 모든 인스턴스가 공유하는 캐시 삭제 로그:
//! - `cache_sync_log`: sequence_id / timestamp / payload
//!
//! timestamp 는 SQLite 자체 시계로 기록 시점에 부여 (Unix milliseconds)
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on startup.
//! - Version 1: Initial schema (cache_sync_log)
//! - Version 2: Index on timestamp for range reads and pruning

use super::log::EventLog;
use crate::event::{EventBatch, LogRecord};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Store-side clock in Unix milliseconds
const NOW_MS_SQL: &str = "CAST(ROUND((julianday('now') - 2440587.5) * 86400000.0) AS INTEGER)";

/// SQLite-backed [`EventLog`]
pub struct SqliteEventLog {
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Open (or create) the shared log database
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode so several processes can share the file
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        info!(db_path = %db_path.display(), "Event log opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory log (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::StoreUnavailable(format!("Failed to create in-memory database: {}", e))
        })?;

        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get current schema version from database
    pub async fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock().await;
        schema_version(&conn)
    }

    /// 로그에 남아있는 행 수
    pub async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_sync_log", [], |row| row.get(0))
            .map_err(unavailable("count log rows"))?;
        Ok(count as u64)
    }

    /// 가장 최근 행의 timestamp
    pub async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let latest: Option<i64> = conn
            .query_row("SELECT MAX(timestamp) FROM cache_sync_log", [], |row| {
                row.get(0)
            })
            .map_err(unavailable("read latest timestamp"))?;
        Ok(latest.and_then(from_millis))
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, batch: &EventBatch) -> Result<i64> {
        if batch.is_empty() {
            return Err(Error::Internal("refusing to append an empty batch".into()));
        }

        let payload = batch.encode()?;
        let conn = self.conn.lock().await;

        conn.execute(
            &format!(
                "INSERT INTO cache_sync_log (timestamp, payload) VALUES ({}, ?1)",
                NOW_MS_SQL
            ),
            params![payload],
        )
        .map_err(unavailable("append batch"))?;

        let sequence_id = conn.last_insert_rowid();

        debug!(
            sequence_id = sequence_id,
            instance_id = %batch.instance_id,
            events = batch.len(),
            "Clear batch appended"
        );

        Ok(sequence_id)
    }

    async fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT sequence_id, timestamp, payload
                FROM cache_sync_log
                WHERE timestamp > ?1
                ORDER BY timestamp ASC, sequence_id ASC
                "#,
            )
            .map_err(unavailable("prepare read"))?;

        let rows = stmt
            .query_map(params![since.timestamp_millis()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(unavailable("read log"))?;

        let mut records = Vec::new();
        for row in rows {
            let (sequence_id, millis, payload) = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable log row");
                    continue;
                }
            };

            let Some(timestamp) = from_millis(millis) else {
                warn!(sequence_id, millis, "Skipping log row with invalid timestamp");
                continue;
            };

            match LogRecord::decode(sequence_id, timestamp, &payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(sequence_id, error = %e, "Skipping malformed log row"),
            }
        }

        Ok(records)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().await;

        let deleted = conn
            .execute(
                "DELETE FROM cache_sync_log WHERE timestamp < ?1",
                params![cutoff.timestamp_millis()],
            )
            .map_err(unavailable("prune log"))?;

        if deleted > 0 {
            info!(deleted = deleted, cutoff = %cutoff, "Pruned expired log rows");
        }

        Ok(deleted as u64)
    }
}

// ============================================================================
// Schema
// ============================================================================

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
}

/// Initialize database schema (base tables)
fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Shared clear log
        CREATE TABLE IF NOT EXISTS cache_sync_log (
            sequence_id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            payload TEXT NOT NULL
        );

        -- Insert initial schema version if not exists
        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )
    .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

    Ok(())
}

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = schema_version(conn)?;

    if current_version >= CURRENT_SCHEMA_VERSION {
        debug!(
            "Database schema is up to date (version {})",
            current_version
        );
        return Ok(());
    }

    info!(
        "Running database migrations from version {} to {}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
        match version {
            2 => migrate_v2(conn)?,
            _ => {
                warn!("Unknown migration version: {}", version);
            }
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![version],
        )
        .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;

        info!("Applied migration to version {}", version);
    }

    Ok(())
}

/// Migration to version 2: timestamp index for range reads and pruning
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cache_sync_log_timestamp ON cache_sync_log(timestamp)",
        [],
    )
    .map_err(|e| Error::Storage(format!("Failed to create timestamp index: {}", e)))?;

    Ok(())
}

// ============================================================================
// 헬퍼 함수
// ============================================================================

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn unavailable(action: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::StoreUnavailable(format!("Failed to {}: {}", action, e))
}
