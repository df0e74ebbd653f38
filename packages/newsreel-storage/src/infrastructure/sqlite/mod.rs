//! SQLite adapter for the `RecordStore` port.
//!
//! Single-table layout with the (scope, key) conflict key as the
//! composite primary key:
//!
//! ```sql
//! CREATE TABLE records (
//!     scope      TEXT NOT NULL,
//!     key        TEXT NOT NULL,
//!     value      TEXT NOT NULL,   -- JSON
//!     created_at TEXT NOT NULL,
//!     expires_at TEXT,
//!     PRIMARY KEY (scope, key)
//! );
//! ```
//!
//! Calls are synchronous rusqlite behind the async trait; the connection
//! is guarded by a mutex, which is adequate for the single-writer access
//! pattern of one pipeline process.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{RecordFilter, RecordStore, StoredRecord};
use crate::error::StorageError;
use crate::Result;

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                scope      TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                PRIMARY KEY (scope, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::database("connection mutex poisoned"))
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(StoredRecord, String)> {
        let value_json: String = row.get(2)?;
        let created_at: DateTime<Utc> = row.get(3)?;
        let expires_at: Option<DateTime<Utc>> = row.get(4)?;
        Ok((
            StoredRecord {
                scope: row.get(0)?,
                key: row.get(1)?,
                value: serde_json::Value::Null,
                created_at,
                expires_at,
            },
            value_json,
        ))
    }

    fn parse_row(raw: (StoredRecord, String)) -> Result<StoredRecord> {
        let (mut record, value_json) = raw;
        record.value = serde_json::from_str(&value_json)?;
        Ok(record)
    }
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn escape_like(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<StoredRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT scope, key, value, created_at, expires_at
                 FROM records WHERE scope = ?1 AND key = ?2",
                params![scope, key],
                Self::row_to_record,
            )
            .optional()?;

        raw.map(Self::parse_row).transpose()
    }

    async fn put(
        &self,
        scope: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut record = StoredRecord::new(scope, key, value);
        if let Some(ttl) = ttl {
            record = record.with_ttl(ttl);
        }
        self.upsert(record).await
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM records WHERE scope = ?1 AND key = ?2",
            params![scope, key],
        )?;
        Ok(())
    }

    async fn query(&self, scope: &str, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        let conn = self.lock()?;
        let pattern = format!(
            "{}%",
            escape_like(filter.key_prefix.as_deref().unwrap_or(""))
        );
        // LIMIT -1 means unbounded in SQLite.
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(
            "SELECT scope, key, value, created_at, expires_at
             FROM records
             WHERE scope = ?1 AND key LIKE ?2 ESCAPE '\\'
             ORDER BY key ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![scope, pattern, limit], Self::row_to_record)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(Self::parse_row(raw?)?);
        }
        Ok(records)
    }

    async fn upsert(&self, record: StoredRecord) -> Result<()> {
        let value_json = serde_json::to_string(&record.value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (scope, key, value, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (scope, key) DO UPDATE SET
                 value = excluded.value,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at",
            params![
                record.scope,
                record.key,
                value_json,
                record.created_at,
                record.expires_at
            ],
        )?;
        Ok(())
    }
}
