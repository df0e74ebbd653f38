//! Content cache: memoizes expensive generation results per channel.
//!
//! Two tiers: a fast in-process map and the durable record store. Every
//! entry carries a TTL (expiry is lazy, applied at read time) and a cost
//! weight used for savings reporting. Lookup misses can fall back to a
//! fuzzy match over near-identical keys, which is what lets a reworded
//! headline reuse yesterday's generated artifact.
//!
//! The cache is an explicit per-channel service: construct one and inject
//! it where needed, there is no process-global instance.

use crate::error::Result;
use crate::similarity::normalized_similarity;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use newsreel_storage::{RecordFilter, RecordStore, StoredRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default acceptance threshold for [`ContentCache::find_similar`].
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Upper bound on durable-tier candidates scanned by a fuzzy lookup.
pub const DURABLE_CANDIDATE_LIMIT: usize = 100;

/// Durable records for cache entries live under this key prefix so that
/// prefix invalidation can never touch pipeline checkpoints.
const RECORD_PREFIX: &str = "cache:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cost_saved: f64,
}

impl CacheEntry {
    fn new(key: &str, value: serde_json::Value, ttl: Duration, cost_saved: f64) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            value,
            created_at: now,
            expires_at: now + ttl,
            cost_saved,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// In-process cache statistics. Durable-tier-only entries are not
/// counted, so the totals are an approximation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_cost_saved: f64,
}

pub struct ContentCache {
    channel_id: String,
    store: Arc<dyn RecordStore>,
    memory: DashMap<String, CacheEntry>,
    /// Per-key single-flight gates: concurrent callers missing on the
    /// same key share one generation instead of duplicating it.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

impl ContentCache {
    pub fn new(channel_id: impl Into<String>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            channel_id: channel_id.into(),
            store,
            memory: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn record_key(key: &str) -> String {
        format!("{}{}", RECORD_PREFIX, key)
    }

    /// Synchronous in-process read. Expired entries are evicted and read
    /// as a miss; the durable tier is not consulted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        {
            let entry = self.memory.get(key)?;
            if !entry.is_expired(Utc::now()) {
                return entry.decode().ok();
            }
        }
        // The map guard is released above; evict the stale entry.
        self.memory.remove(key);
        None
    }

    /// Read through both tiers; a durable hit is promoted into memory.
    pub async fn get_async<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }

        let record_key = Self::record_key(key);
        let Some(record) = self.store.get(&self.channel_id, &record_key).await? else {
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_value(record.value) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable cache record");
                return Ok(None);
            }
        };

        if entry.is_expired(Utc::now()) {
            // Lazy expiry: delete is best-effort, a failure just means
            // the next reader evicts again.
            if let Err(err) = self.store.delete(&self.channel_id, &record_key).await {
                warn!(key, error = %err, "failed to delete expired cache record");
            }
            return Ok(None);
        }

        let value = entry.decode()?;
        self.memory.insert(key.to_string(), entry);
        Ok(Some(value))
    }

    /// Direct write to both tiers.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        cost: f64,
    ) -> Result<()> {
        let entry = CacheEntry::new(key, serde_json::to_value(value)?, ttl, cost);
        self.memory.insert(key.to_string(), entry.clone());
        self.put_durable(&entry).await
    }

    async fn put_durable(&self, entry: &CacheEntry) -> Result<()> {
        let ttl = entry.expires_at - entry.created_at;
        let record = StoredRecord::new(
            &self.channel_id,
            Self::record_key(&entry.key),
            serde_json::to_value(entry)?,
        )
        .with_ttl(ttl);
        self.store.upsert(record).await?;
        Ok(())
    }

    /// Memoized generation: both tiers are consulted before `generate`
    /// runs, and the result is stored with the given TTL and cost weight.
    ///
    /// Single-flight: the first caller for a key computes and stores the
    /// result while concurrent callers for the same key wait on the gate
    /// and then re-read, so `generate` runs at most once per logical miss.
    pub async fn get_or_generate<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        cost: f64,
        generate: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get_async(key).await? {
            debug!(key, "cache hit");
            return Ok(value);
        }

        let gate = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = gate.lock().await;

        // A concurrent caller may have generated while we waited.
        if let Some(value) = self.get_async(key).await? {
            debug!(key, "cache hit after waiting on in-flight generation");
            drop(guard);
            self.inflight.remove(key);
            return Ok(value);
        }

        let generated = generate().await;
        let value = match generated {
            Ok(value) => value,
            Err(err) => {
                drop(guard);
                self.inflight.remove(key);
                return Err(err);
            }
        };

        let entry = CacheEntry::new(key, serde_json::to_value(&value)?, ttl, cost);
        self.memory.insert(key.to_string(), entry.clone());
        if let Err(err) = self.put_durable(&entry).await {
            warn!(key, error = %err, "durable cache write failed, entry kept in memory");
        }

        drop(guard);
        self.inflight.remove(key);
        Ok(value)
    }

    /// Fuzzy lookup: normalizes the key (trim + lowercase) and scores it
    /// against in-process entries plus up to [`DURABLE_CANDIDATE_LIMIT`]
    /// durable entries with normalized Levenshtein similarity. Returns
    /// the best-scoring candidate at or above `threshold` within that
    /// bounded set.
    pub async fn find_similar(&self, key: &str, threshold: f64) -> Result<Option<CacheEntry>> {
        let needle = normalize(key);
        let now = Utc::now();
        let mut seen: HashSet<String> = HashSet::new();
        let mut best: Option<(f64, CacheEntry)> = None;

        let consider = |entry: CacheEntry, best: &mut Option<(f64, CacheEntry)>| {
            let score = normalized_similarity(&needle, &normalize(&entry.key));
            if score >= threshold && best.as_ref().map_or(true, |(top, _)| score > *top) {
                *best = Some((score, entry));
            }
        };

        for item in self.memory.iter() {
            if item.is_expired(now) {
                continue;
            }
            seen.insert(item.key.clone());
            consider(item.value().clone(), &mut best);
        }

        let records = self
            .store
            .query(
                &self.channel_id,
                &RecordFilter::prefix(RECORD_PREFIX).with_limit(DURABLE_CANDIDATE_LIMIT),
            )
            .await?;
        for record in records {
            let Ok(entry) = serde_json::from_value::<CacheEntry>(record.value) else {
                continue;
            };
            if entry.is_expired(now) || seen.contains(&entry.key) {
                continue;
            }
            consider(entry, &mut best);
        }

        Ok(best.map(|(score, entry)| {
            debug!(key, matched = %entry.key, score, "fuzzy cache match");
            entry
        }))
    }

    /// Exact hit, then fuzzy hit, then memoized generation.
    pub async fn get_or_generate_with_fuzzy<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        cost: f64,
        threshold: f64,
        generate: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get_async(key).await? {
            return Ok(value);
        }

        if let Some(entry) = self.find_similar(key, threshold).await? {
            match entry.decode() {
                Ok(value) => {
                    info!(key, matched = %entry.key, "serving fuzzy cache hit");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(key, matched = %entry.key, error = %err,
                        "fuzzy match had incompatible payload, regenerating");
                }
            }
        }

        self.get_or_generate(key, ttl, cost, generate).await
    }

    /// Remove every entry (both tiers) whose key starts with `prefix`.
    /// Returns the number of distinct keys removed.
    pub async fn invalidate_by_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed: HashSet<String> = HashSet::new();

        self.memory.retain(|key, _| {
            if key.starts_with(prefix) {
                removed.insert(key.clone());
                false
            } else {
                true
            }
        });

        let records = self
            .store
            .query(
                &self.channel_id,
                &RecordFilter::prefix(format!("{}{}", RECORD_PREFIX, prefix)),
            )
            .await?;
        for record in records {
            self.store.delete(&self.channel_id, &record.key).await?;
            removed.insert(
                record
                    .key
                    .strip_prefix(RECORD_PREFIX)
                    .unwrap_or(&record.key)
                    .to_string(),
            );
        }

        info!(prefix, count = removed.len(), "invalidated cache entries");
        Ok(removed.len())
    }

    /// Entry count and summed cost weights for the in-process tier.
    pub fn stats(&self) -> CacheStats {
        let mut total_cost_saved = 0.0;
        let mut entries = 0;
        for item in self.memory.iter() {
            entries += 1;
            total_cost_saved += item.cost_saved;
        }
        CacheStats {
            entries,
            total_cost_saved,
        }
    }
}
