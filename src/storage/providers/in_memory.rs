//! # In-Memory Store
//!
//! Map-backed implementation of the three durable stores for tests and
//! local development. The payload ledger and reply store share one lock so
//! `store_fetch_result` is atomic, matching the transactional contract of
//! the PostgreSQL backend.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::RateReply;
use crate::storage::errors::StorageResult;
use crate::storage::provider::DedupEntry;

#[derive(Debug, Default)]
struct CacheState {
    /// payload text -> last_save_payload
    payloads: HashMap<String, DateTime<Utc>>,
    /// cache key (reply.currency) -> reply
    replies: HashMap<String, RateReply>,
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    cache: RwLock<CacheState>,
    dedup: RwLock<HashMap<Uuid, DedupEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn payload_last_saved(
        &self,
        payload: &str,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let cache = self.cache.read().await;
        Ok(cache.payloads.get(payload).copied())
    }

    pub async fn touch_payload(&self, payload: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let mut cache = self.cache.write().await;
        cache.payloads.insert(payload.to_string(), now);
        Ok(())
    }

    pub async fn find_reply(&self, cache_key: &str) -> StorageResult<Option<RateReply>> {
        let cache = self.cache.read().await;
        Ok(cache.replies.get(cache_key).cloned())
    }

    pub async fn store_fetch_result(
        &self,
        payload: &str,
        reply: &RateReply,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut cache = self.cache.write().await;
        cache.replies.insert(reply.currency.clone(), reply.clone());
        cache.payloads.insert(payload.to_string(), now);
        Ok(())
    }

    pub async fn dedup_exists(&self, rid: Uuid) -> StorageResult<bool> {
        let dedup = self.dedup.read().await;
        Ok(dedup.contains_key(&rid))
    }

    pub async fn dedup_insert(
        &self,
        rid: Uuid,
        expiration_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut dedup = self.dedup.write().await;
        dedup.entry(rid).or_insert(DedupEntry {
            request_id: rid,
            expiration_date,
            created_at: now,
        });
        Ok(())
    }

    pub async fn dedup_purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut dedup = self.dedup.write().await;
        let before = dedup.len();
        dedup.retain(|_, entry| entry.expiration_date >= now);
        Ok((before - dedup.len()) as u64)
    }

    pub async fn dedup_purge_older_than(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let threshold = now - Duration::days(days);
        let mut dedup = self.dedup.write().await;
        let before = dedup.len();
        dedup.retain(|_, entry| entry.created_at >= threshold);
        Ok((before - dedup.len()) as u64)
    }

    // =========================================================================
    // Test hooks
    // =========================================================================

    /// A dedup row, if present (for tests).
    pub async fn dedup_entry(&self, rid: Uuid) -> Option<DedupEntry> {
        let dedup = self.dedup.read().await;
        dedup.get(&rid).cloned()
    }

    /// Number of dedup rows (for tests).
    pub async fn dedup_len(&self) -> usize {
        let dedup = self.dedup.read().await;
        dedup.len()
    }

    /// Overwrite a payload row's freshness stamp (for aging scenarios in
    /// tests).
    pub async fn age_payload(&self, payload: &str, last_saved: DateTime<Utc>) {
        let mut cache = self.cache.write().await;
        cache.payloads.insert(payload.to_string(), last_saved);
    }
}
