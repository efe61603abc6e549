//! # Request-Side Handler
//!
//! Consumes the request topic and decides, per record: drop (duplicate),
//! answer from the cache, or forward to the fetch topic.
//!
//! The cache consult is set-based, not key-based: the row stored under the
//! exact query argument answers first, but any fresh superset row (in
//! practice the ALL row) also counts as a hit and is projected down to the
//! requested codes. Only when no fresh covering row exists does the record
//! go to the fetch tier.
//!
//! The dedup insert is the first durable side effect, so a retried delivery
//! can never double-write the cache.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::constants::{dlt_reason, error_body, FETCH_TOPIC, RESPONSE_TOPIC};
use crate::engine::retry_storage_once;
use crate::messaging::{BusProvider, BusRecord, MessagingError, RecordHandler};
use crate::models::{CurrencyQuery, RateReply};
use crate::storage::{StorageError, StorageProvider};

/// Payload text whose reply row covers every quoted code.
const ALL_PAYLOAD: &str = "ALL:";
const ALL_KEY: &str = "ALL";

/// Handler for records arriving on `request-currency-topic`.
#[derive(Debug)]
pub struct RequestSideHandler {
    bus: Arc<BusProvider>,
    storage: Arc<StorageProvider>,
    freshness: Duration,
    dedup_ttl: Duration,
}

impl RequestSideHandler {
    pub fn new(
        bus: Arc<BusProvider>,
        storage: Arc<StorageProvider>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            bus,
            storage,
            freshness: Duration::seconds(config.cache.freshness_sec),
            dedup_ttl: Duration::days(config.dedup.ttl_days),
        }
    }

    async fn process(&self, record: BusRecord) {
        let body = record.body;

        // The correlation id joins every hop; without it the record is
        // unanswerable.
        let Some(rid) = record.headers.message_key() else {
            warn!(body = %body, "request record without messageKey header");
            self.dead_letter(None, dlt_reason::MISSING_CORRELATION, &body)
                .await;
            return;
        };

        if body.is_empty() || !CurrencyQuery::has_known_prefix(&body) {
            warn!(rid = %rid, body = %body, "unrecognised request body");
            self.dead_letter(Some(rid), dlt_reason::UNRECOGNISED, &body)
                .await;
            return;
        }
        let query = match CurrencyQuery::parse(&body) {
            Ok(query) => query,
            Err(err) => {
                warn!(rid = %rid, body = %body, error = %err, "request body failed validation");
                self.dead_letter(Some(rid), dlt_reason::UNRECOGNISED, &body)
                    .await;
                return;
            }
        };

        match self.resolve(rid, &body, &query).await {
            Ok(()) => {}
            Err(err) => {
                error!(rid = %rid, error = %err, "storage failed while resolving request");
                self.storage_failure(rid, &body).await;
            }
        }
    }

    /// The dedup check, freshness decision, and cache consult. Every
    /// storage error here has already been retried once.
    async fn resolve(
        &self,
        rid: Uuid,
        body: &str,
        query: &CurrencyQuery,
    ) -> Result<(), StorageError> {
        let now = Utc::now();

        // Dedup: a replayed delivery of an already-seen rid is dropped
        // silently, before any other durable side effect.
        let duplicate =
            retry_storage_once("dedup_exists", || self.storage.dedup_exists(rid)).await?;
        if duplicate {
            debug!(rid = %rid, "duplicate delivery dropped");
            return Ok(());
        }
        retry_storage_once("dedup_insert", || {
            self.storage.dedup_insert(rid, now + self.dedup_ttl, now)
        })
        .await?;

        let last_saved = retry_storage_once("payload_last_saved", || {
            self.storage.payload_last_saved(body)
        })
        .await?;

        match last_saved {
            Some(last_saved) if now - last_saved >= self.freshness => {
                // Stale: stamp the ledger so concurrent requests do not
                // stampede the upstream, then refetch.
                retry_storage_once("touch_payload", || self.storage.touch_payload(body, now))
                    .await?;
                info!(
                    rid = %rid,
                    body = %body,
                    age_sec = (now - last_saved).num_seconds(),
                    "payload stale, refreshing via fetch tier"
                );
                self.forward_to_fetch(rid, body).await;
                Ok(())
            }
            Some(_) => {
                // Fresh payload: its own row answers first, a fresh superset
                // row second.
                if self.serve_from_key(rid, query, &query.cache_key()).await? {
                    return Ok(());
                }
                if self.serve_from_all_row(rid, query, now).await? {
                    return Ok(());
                }
                // The stored reply cannot cover the request (code set
                // changed): refresh.
                retry_storage_once("touch_payload", || self.storage.touch_payload(body, now))
                    .await?;
                debug!(rid = %rid, body = %body, "cached reply lacks requested codes");
                self.forward_to_fetch(rid, body).await;
                Ok(())
            }
            None => {
                // Unseen payload. A fresh ALL row that quotes every
                // requested code still answers without an upstream trip.
                if query.cache_key() != ALL_KEY
                    && self.serve_from_all_row(rid, query, now).await?
                {
                    return Ok(());
                }
                info!(rid = %rid, body = %body, "payload unseen, forwarding to fetch tier");
                self.forward_to_fetch(rid, body).await;
                Ok(())
            }
        }
    }

    /// Serve from the row stored under `key`, if it covers the requested
    /// code set. Returns `true` when a reply was published.
    async fn serve_from_key(
        &self,
        rid: Uuid,
        query: &CurrencyQuery,
        key: &str,
    ) -> Result<bool, StorageError> {
        let Some(reply) = retry_storage_once("find_reply", || self.storage.find_reply(key)).await?
        else {
            return Ok(false);
        };
        let requested = query.code_set();
        if !reply.contains_codes(&requested) {
            return Ok(false);
        }

        // A strict superset is still a hit: project down to the requested
        // set and echo the requested argument, stamping the current rid.
        let mut projected = reply.project(&requested, rid);
        projected.currency = query.cache_key();
        self.publish_reply(rid, &projected, key).await;
        Ok(true)
    }

    /// Serve from the ALL row, gated by the freshness of the `"ALL:"`
    /// payload itself.
    async fn serve_from_all_row(
        &self,
        rid: Uuid,
        query: &CurrencyQuery,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let all_saved = retry_storage_once("payload_last_saved", || {
            self.storage.payload_last_saved(ALL_PAYLOAD)
        })
        .await?;
        let fresh = matches!(all_saved, Some(saved) if now - saved < self.freshness);
        if !fresh {
            return Ok(false);
        }
        self.serve_from_key(rid, query, ALL_KEY).await
    }

    async fn publish_reply(&self, rid: Uuid, reply: &RateReply, served_from: &str) {
        let json = match serde_json::to_string(reply) {
            Ok(json) => json,
            Err(err) => {
                error!(rid = %rid, error = %err, "reply serialization failed");
                self.storage_failure(rid, &reply.currency).await;
                return;
            }
        };
        info!(rid = %rid, key = %reply.currency, served_from = %served_from, "cache hit");
        if let Err(err) = self
            .bus
            .publish(RESPONSE_TOPIC, BusRecord::for_response(rid, json))
            .await
        {
            self.log_publish_failure(rid, RESPONSE_TOPIC, err);
        }
    }

    async fn forward_to_fetch(&self, rid: Uuid, body: &str) {
        if let Err(err) = self
            .bus
            .publish(FETCH_TOPIC, BusRecord::for_request(rid, body))
            .await
        {
            self.log_publish_failure(rid, FETCH_TOPIC, err);
        }
    }

    /// Second storage failure in a row: dead-letter the record and emit a
    /// synthetic error so the edge surfaces an upstream failure instead of
    /// timing out.
    async fn storage_failure(&self, rid: Uuid, body: &str) {
        self.dead_letter(Some(rid), dlt_reason::STORAGE_FAILURE, body)
            .await;
        let synthetic = error_body("storage failure while resolving request");
        if let Err(err) = self
            .bus
            .publish(RESPONSE_TOPIC, BusRecord::for_response(rid, synthetic))
            .await
        {
            self.log_publish_failure(rid, RESPONSE_TOPIC, err);
        }
    }

    async fn dead_letter(&self, rid: Option<Uuid>, reason: &str, body: &str) {
        if let Err(err) = self.bus.dead_letter(rid, reason, body).await {
            error!(reason, error = %err, "dead-letter publish failed");
        }
    }

    fn log_publish_failure(&self, rid: Uuid, topic: &str, err: MessagingError) {
        if err.is_fenced() {
            // Never swallow a fence: the record must be re-consumed after
            // rebalance by a producer with a fresh epoch.
            error!(rid = %rid, topic, error = %err, "producer fenced during publish");
        } else {
            error!(rid = %rid, topic, error = %err, "publish failed");
        }
    }
}

#[async_trait]
impl RecordHandler for RequestSideHandler {
    fn name(&self) -> &'static str {
        "request-side"
    }

    async fn handle(&self, record: BusRecord) {
        self.process(record).await;
    }
}
