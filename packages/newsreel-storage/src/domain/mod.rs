//! Domain layer for the production record store
//!
//! # Domain Models
//!
//! - `StoredRecord`: a JSON-valued record scoped by channel, unique per
//!   (scope, key), with an optional expiry used by the caching layers
//! - `RecordFilter`: bounded key-prefix query
//!
//! # Port Trait
//!
//! - `RecordStore`: the durable persistence gateway. Everything the
//!   production pipeline persists (job snapshots, stage artifacts, cache
//!   entries, asset records) goes through this trait, so the core never
//!   sees a concrete database.
//!
//! # Examples
//!
//! ```rust,ignore
//! use newsreel_storage::{MemoryRecordStore, RecordFilter, RecordStore, StoredRecord};
//!
//! async fn example(store: impl RecordStore) -> newsreel_storage::Result<()> {
//!     store
//!         .put("channel-1", "asset:42", serde_json::json!({"url": "gs://x"}), None)
//!         .await?;
//!
//!     let record = store.get("channel-1", "asset:42").await?;
//!     assert!(record.is_some());
//!
//!     let assets = store
//!         .query("channel-1", &RecordFilter::prefix("asset:"))
//!         .await?;
//!     assert_eq!(assets.len(), 1);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A durable record, unique per (scope, key).
///
/// Scope is the channel id; the key namespace within a scope is owned by
/// the caller (`cache:`, `asset:`, `production:` prefixes in practice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub scope: String,
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Expiry is advisory: the store returns expired records and the
    /// caller decides whether a stale read counts as absent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    pub fn new(
        scope: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            scope: scope.into(),
            key: key.into(),
            value,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now > at)
    }
}

/// Bounded key-prefix filter for `RecordStore::query`.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub key_prefix: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: Some(prefix.into()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Durable record store abstraction (the persistence gateway).
///
/// # Implementations
///
/// - `MemoryRecordStore`: dashmap-backed, for tests and development
/// - `SqliteRecordStore` (feature `sqlite`): rusqlite adapter
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a record, or `None` when absent. Expired records are still
    /// returned; see `StoredRecord::is_expired`.
    async fn get(&self, scope: &str, key: &str) -> Result<Option<StoredRecord>>;

    /// Write a record, replacing any existing record for (scope, key).
    async fn put(
        &self,
        scope: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Delete a record. Deleting an absent record is not an error.
    async fn delete(&self, scope: &str, key: &str) -> Result<()>;

    /// Query records in a scope, key-ascending, honoring the filter's
    /// prefix and limit.
    async fn query(&self, scope: &str, filter: &RecordFilter) -> Result<Vec<StoredRecord>>;

    /// Insert or replace on the (scope, key) conflict key.
    async fn upsert(&self, record: StoredRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_record_new() {
        let record = StoredRecord::new("channel-1", "asset:42", serde_json::json!({"a": 1}));

        assert_eq!(record.scope, "channel-1");
        assert_eq!(record.key, "asset:42");
        assert_eq!(record.value, serde_json::json!({"a": 1}));
        assert!(record.expires_at.is_none());
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn test_stored_record_ttl() {
        let record = StoredRecord::new("channel-1", "cache:k", serde_json::Value::Null)
            .with_ttl(Duration::seconds(60));

        assert!(!record.is_expired(record.created_at + Duration::seconds(30)));
        assert!(record.is_expired(record.created_at + Duration::seconds(61)));
    }

    #[test]
    fn test_stored_record_serde() {
        let record = StoredRecord::new("channel-1", "k", serde_json::json!("v"))
            .with_ttl(Duration::hours(1));

        let json = serde_json::to_string(&record).unwrap();
        let back: StoredRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back, record);
    }

    #[test]
    fn test_record_filter_builders() {
        let filter = RecordFilter::prefix("cache:").with_limit(100);
        assert_eq!(filter.key_prefix.as_deref(), Some("cache:"));
        assert_eq!(filter.limit, Some(100));

        let all = RecordFilter::default();
        assert!(all.key_prefix.is_none());
        assert!(all.limit.is_none());
    }
}
