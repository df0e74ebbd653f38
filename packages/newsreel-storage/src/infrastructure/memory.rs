//! In-memory `RecordStore` adapter.
//!
//! Used by tests and single-process development setups. Records live in
//! a concurrent map keyed by (scope, key); queries scan and sort, which
//! is fine at the volumes a test or one channel produces.

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;

use crate::domain::{RecordFilter, RecordStore, StoredRecord};
use crate::Result;

#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<(String, String), StoredRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<StoredRecord>> {
        Ok(self
            .records
            .get(&(scope.to_string(), key.to_string()))
            .map(|r| r.value().clone()))
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
        self.records.remove(&(scope.to_string(), key.to_string()));
        Ok(())
    }

    async fn query(&self, scope: &str, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        let mut matched: Vec<StoredRecord> = self
            .records
            .iter()
            .filter(|entry| {
                let (record_scope, record_key) = entry.key();
                record_scope.as_str() == scope
                    && filter
                        .key_prefix
                        .as_deref()
                        .map_or(true, |prefix| record_key.starts_with(prefix))
            })
            .map(|entry| entry.value().clone())
            .collect();

        // Key-ascending for deterministic scan order across adapters.
        matched.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    async fn upsert(&self, record: StoredRecord) -> Result<()> {
        self.records
            .insert((record.scope.clone(), record.key.clone()), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryRecordStore::new();

        store
            .put("channel-1", "asset:1", serde_json::json!({"url": "u"}), None)
            .await
            .unwrap();

        let record = store.get("channel-1", "asset:1").await.unwrap().unwrap();
        assert_eq!(record.value, serde_json::json!({"url": "u"}));

        assert!(store.get("channel-2", "asset:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let store = MemoryRecordStore::new();

        store
            .put("c", "k", serde_json::json!(1), None)
            .await
            .unwrap();
        store
            .put("c", "k", serde_json::json!(2), None)
            .await
            .unwrap();

        let record = store.get("c", "k").await.unwrap().unwrap();
        assert_eq!(record.value, serde_json::json!(2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryRecordStore::new();

        store
            .put("c", "k", serde_json::Value::Null, None)
            .await
            .unwrap();
        store.delete("c", "k").await.unwrap();
        store.delete("c", "k").await.unwrap();

        assert!(store.get("c", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_prefix_and_limit() {
        let store = MemoryRecordStore::new();

        for key in ["cache:news_a", "cache:news_b", "cache:sports_a", "asset:1"] {
            store
                .put("c", key, serde_json::Value::Null, None)
                .await
                .unwrap();
        }

        let news = store
            .query("c", &RecordFilter::prefix("cache:news_"))
            .await
            .unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].key, "cache:news_a");
        assert_eq!(news[1].key, "cache:news_b");

        let bounded = store
            .query("c", &RecordFilter::prefix("cache:").with_limit(1))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 1);
    }

    #[tokio::test]
    async fn test_query_scope_isolation() {
        let store = MemoryRecordStore::new();

        store
            .put("channel-1", "k", serde_json::Value::Null, None)
            .await
            .unwrap();
        store
            .put("channel-2", "k", serde_json::Value::Null, None)
            .await
            .unwrap();

        let records = store
            .query("channel-1", &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].scope, "channel-1");
    }

    #[tokio::test]
    async fn test_ttl_recorded_not_enforced() {
        let store = MemoryRecordStore::new();

        store
            .put(
                "c",
                "k",
                serde_json::Value::Null,
                Some(Duration::seconds(-1)),
            )
            .await
            .unwrap();

        // The store hands expired records back; expiry policy is the caller's.
        let record = store.get("c", "k").await.unwrap().unwrap();
        assert!(record.is_expired(chrono::Utc::now()));
    }
}
