//! # Fetch-Side Handler
//!
//! Consumes the fetch topic: calls the upstream API under the retry policy,
//! projects the rates to the requested codes, upserts the cache entry and
//! the payload ledger in one commit, and publishes the reply.
//!
//! Exhausted retries dead-letter the record *and* emit a synthetic error on
//! the response topic so the edge surfaces an upstream failure instead of
//! timing out. Validation failures (bad prefix, unknown code) dead-letter
//! only. The edge times out, deliberately, so validation bugs never
//! masquerade as business errors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{RelayConfig, RetryConfig};
use crate::constants::{dlt_reason, error_body, RESPONSE_TOPIC};
use crate::engine::retry_storage_once;
use crate::messaging::{BusProvider, BusRecord, MessagingError, RecordHandler};
use crate::models::{CurrencyQuery, RateReply};
use crate::storage::StorageProvider;
use crate::upstream::UpstreamProvider;

/// Handler for records arriving on `fetch-currency-topic`.
#[derive(Debug)]
pub struct FetchSideHandler {
    bus: Arc<BusProvider>,
    storage: Arc<StorageProvider>,
    upstream: Arc<UpstreamProvider>,
    retry: RetryConfig,
}

impl FetchSideHandler {
    pub fn new(
        bus: Arc<BusProvider>,
        storage: Arc<StorageProvider>,
        upstream: Arc<UpstreamProvider>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            bus,
            storage,
            upstream,
            retry: config.retry.clone(),
        }
    }

    async fn process(&self, record: BusRecord) {
        let body = record.body;

        let Some(rid) = record.headers.message_key() else {
            warn!(body = %body, "fetch record without messageKey header");
            self.dead_letter(None, dlt_reason::MISSING_CORRELATION, &body)
                .await;
            return;
        };

        let query = match CurrencyQuery::parse(&body) {
            Ok(query) => query,
            Err(err) => {
                warn!(rid = %rid, body = %body, error = %err, "fetch body failed validation");
                self.dead_letter(Some(rid), dlt_reason::UNRECOGNISED, &body)
                    .await;
                return;
            }
        };

        let payload = match self.upstream.fetch_latest_with_retry(&self.retry).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(rid = %rid, error = %err, "upstream retries exhausted");
                self.dead_letter(Some(rid), dlt_reason::UPSTREAM_UNAVAILABLE, &body)
                    .await;
                self.publish_synthetic_error(rid, "exchange rates upstream unavailable")
                    .await;
                return;
            }
        };

        // Project to the requested codes; ALL keeps everything. A requested
        // code the upstream does not quote is a validation failure, not a
        // business error: dead-letter, no reply.
        let requested = query.code_set();
        let rates: HashMap<String, f64> = if requested.is_empty() {
            payload.rates.clone()
        } else {
            let mut projected = HashMap::with_capacity(requested.len());
            for code in &requested {
                match payload.rates.get(code) {
                    Some(rate) => {
                        projected.insert(code.clone(), *rate);
                    }
                    None => {
                        warn!(rid = %rid, code = %code, "code absent from upstream rates");
                        self.dead_letter(Some(rid), dlt_reason::UNKNOWN_CODE, &body)
                            .await;
                        return;
                    }
                }
            }
            projected
        };

        let reply = RateReply::new(rates, &payload.base, &payload.date, query.cache_key(), rid);

        let now = Utc::now();
        if let Err(err) = retry_storage_once("store_fetch_result", || {
            self.storage.store_fetch_result(&body, &reply, now)
        })
        .await
        {
            error!(rid = %rid, error = %err, "cache upsert failed");
            self.dead_letter(Some(rid), dlt_reason::STORAGE_FAILURE, &body)
                .await;
            self.publish_synthetic_error(rid, "storage failure while persisting rates")
                .await;
            return;
        }

        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(err) => {
                error!(rid = %rid, error = %err, "reply serialization failed");
                self.publish_synthetic_error(rid, "reply serialization failed")
                    .await;
                return;
            }
        };

        info!(rid = %rid, key = %reply.currency, rates = reply.rates.len(), "fetched and cached");
        if let Err(err) = self
            .bus
            .publish(RESPONSE_TOPIC, BusRecord::for_response(rid, json))
            .await
        {
            // The cache write committed; if the publish is lost the edge
            // times out and a retry replays as a fresh cache hit.
            self.log_publish_failure(rid, err);
        }
    }

    async fn publish_synthetic_error(&self, rid: Uuid, message: &str) {
        let record = BusRecord::for_response(rid, error_body(message));
        if let Err(err) = self.bus.publish(RESPONSE_TOPIC, record).await {
            self.log_publish_failure(rid, err);
        }
    }

    async fn dead_letter(&self, rid: Option<Uuid>, reason: &str, body: &str) {
        if let Err(err) = self.bus.dead_letter(rid, reason, body).await {
            error!(reason, error = %err, "dead-letter publish failed");
        }
    }

    fn log_publish_failure(&self, rid: Uuid, err: MessagingError) {
        if err.is_fenced() {
            error!(rid = %rid, error = %err, "producer fenced during publish");
        } else {
            error!(rid = %rid, error = %err, "publish failed");
        }
    }
}

#[async_trait]
impl RecordHandler for FetchSideHandler {
    fn name(&self) -> &'static str {
        "fetch-side"
    }

    async fn handle(&self, record: BusRecord) {
        self.process(record).await;
    }
}
