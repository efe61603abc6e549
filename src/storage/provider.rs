//! # Storage Provider
//!
//! Enum dispatch over the concrete store backends. The engine handlers and
//! the sweeper hold an `Arc<StorageProvider>` and never care which backend
//! is wired in.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::RateReply;
use crate::storage::errors::StorageResult;
use crate::storage::providers::{InMemoryStore, PostgresStore};

/// One row of the dedup ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupEntry {
    pub request_id: Uuid,
    pub expiration_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The configured storage backend.
#[derive(Debug)]
pub enum StorageProvider {
    Postgres(PostgresStore),
    InMemory(InMemoryStore),
}

impl StorageProvider {
    /// A fresh in-memory store.
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryStore::new())
    }

    // =========================================================================
    // Payload ledger
    // =========================================================================

    /// `last_save_payload` for an exact payload text, if the ledger has it.
    pub async fn payload_last_saved(
        &self,
        payload: &str,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        match self {
            Self::Postgres(store) => store.payload_last_saved(payload).await,
            Self::InMemory(store) => store.payload_last_saved(payload).await,
        }
    }

    /// Upsert a payload row, setting `last_save_payload = now`.
    pub async fn touch_payload(&self, payload: &str, now: DateTime<Utc>) -> StorageResult<()> {
        match self {
            Self::Postgres(store) => store.touch_payload(payload, now).await,
            Self::InMemory(store) => store.touch_payload(payload, now).await,
        }
    }

    // =========================================================================
    // Reply store
    // =========================================================================

    /// The cached reply for a query argument, if any.
    pub async fn find_reply(&self, cache_key: &str) -> StorageResult<Option<RateReply>> {
        match self {
            Self::Postgres(store) => store.find_reply(cache_key).await,
            Self::InMemory(store) => store.find_reply(cache_key).await,
        }
    }

    /// Persist a fresh fetch result: upsert the reply (keyed by
    /// `reply.currency`) and the payload ledger row in one commit, so a
    /// reader never observes a new reply with a stale freshness stamp.
    pub async fn store_fetch_result(
        &self,
        payload: &str,
        reply: &RateReply,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        match self {
            Self::Postgres(store) => store.store_fetch_result(payload, reply, now).await,
            Self::InMemory(store) => store.store_fetch_result(payload, reply, now).await,
        }
    }

    // =========================================================================
    // Dedup ledger
    // =========================================================================

    /// Whether a correlation id has been seen before.
    pub async fn dedup_exists(&self, rid: Uuid) -> StorageResult<bool> {
        match self {
            Self::Postgres(store) => store.dedup_exists(rid).await,
            Self::InMemory(store) => store.dedup_exists(rid).await,
        }
    }

    /// Record a correlation id. Idempotent: re-inserting an existing `rid`
    /// is a no-op; the unique constraint on `request_id` is the authority
    /// under concurrency.
    pub async fn dedup_insert(
        &self,
        rid: Uuid,
        expiration_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        match self {
            Self::Postgres(store) => store.dedup_insert(rid, expiration_date, now).await,
            Self::InMemory(store) => store.dedup_insert(rid, expiration_date, now).await,
        }
    }

    /// Remove rows whose `expiration_date` has passed. Returns the count.
    pub async fn dedup_purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        match self {
            Self::Postgres(store) => store.dedup_purge_expired(now).await,
            Self::InMemory(store) => store.dedup_purge_expired(now).await,
        }
    }

    /// Remove rows older than `days` by creation time, regardless of their
    /// expiration date. Returns the count.
    pub async fn dedup_purge_older_than(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        match self {
            Self::Postgres(store) => store.dedup_purge_older_than(days, now).await,
            Self::InMemory(store) => store.dedup_purge_older_than(days, now).await,
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub async fn health_check(&self) -> bool {
        match self {
            Self::Postgres(store) => store.health_check().await,
            Self::InMemory(_) => true,
        }
    }

    /// Provider name for logging and metrics.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::InMemory(_) => "in_memory",
        }
    }

    /// Access the in-memory backend (test hooks).
    pub fn as_in_memory(&self) -> Option<&InMemoryStore> {
        match self {
            Self::InMemory(store) => Some(store),
            _ => None,
        }
    }
}
