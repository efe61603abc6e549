//! End-to-end scenarios over the full in-memory stack: edge gateway,
//! request-side and fetch-side handlers on their own consumer groups, the
//! response listener, and a scripted upstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use currency_relay::config::{EdgeConfig, RelayConfig, RetryConfig};
use currency_relay::constants::{
    DEAD_LETTER_TOPIC, EDGE_GROUP, FETCH_GROUP, FETCH_TOPIC, REQUEST_GROUP, REQUEST_TOPIC,
    RESPONSE_TOPIC,
};
use currency_relay::correlator::{PendingRequests, QueryGateway, ResponseListener};
use currency_relay::engine::{FetchSideHandler, RequestSideHandler};
use currency_relay::error::RelayError;
use currency_relay::executor::WorkerPool;
use currency_relay::messaging::{BusProvider, BusRecord, ConsumerHandle, TopicConsumer};
use currency_relay::models::{QueryKind, RateReply};
use currency_relay::storage::StorageProvider;
use currency_relay::upstream::{UpstreamProvider, UpstreamRates};

const POLL: Duration = Duration::from_millis(5);

struct Relay {
    bus: Arc<BusProvider>,
    storage: Arc<StorageProvider>,
    upstream: Arc<UpstreamProvider>,
    pool: Arc<WorkerPool>,
    pending: Arc<PendingRequests>,
    gateway: QueryGateway,
    consumers: Vec<ConsumerHandle>,
}

fn test_config(timeout_sec: u64) -> RelayConfig {
    RelayConfig {
        retry: RetryConfig {
            max_attempts: 2,
            backoff_ms: 1,
            multiplier: 2.0,
            cap_ms: 2,
        },
        edge: EdgeConfig {
            request_timeout_sec: timeout_sec,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn start_relay(upstream: UpstreamProvider, config: RelayConfig) -> Relay {
    let bus = Arc::new(BusProvider::new_in_memory());
    bus.ensure_topics(&[
        REQUEST_TOPIC,
        FETCH_TOPIC,
        RESPONSE_TOPIC,
        DEAD_LETTER_TOPIC,
    ])
    .await
    .unwrap();

    let storage = Arc::new(StorageProvider::new_in_memory());
    let upstream = Arc::new(upstream);
    let pool = WorkerPool::start(&config.pool);
    let pending = Arc::new(PendingRequests::new());
    let gateway = QueryGateway::new(
        Arc::clone(&bus),
        Arc::clone(&pool),
        Arc::clone(&pending),
        &config.edge,
    );

    let consumers = vec![
        TopicConsumer::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::new(RequestSideHandler::new(
                Arc::clone(&bus),
                Arc::clone(&storage),
                &config,
            )),
            REQUEST_TOPIC,
            REQUEST_GROUP,
        )
        .with_poll_interval(POLL)
        .spawn(),
        TopicConsumer::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::new(FetchSideHandler::new(
                Arc::clone(&bus),
                Arc::clone(&storage),
                Arc::clone(&upstream),
                &config,
            )),
            FETCH_TOPIC,
            FETCH_GROUP,
        )
        .with_poll_interval(POLL)
        .spawn(),
        TopicConsumer::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::new(ResponseListener::new(Arc::clone(&pending))),
            RESPONSE_TOPIC,
            EDGE_GROUP,
        )
        .with_poll_interval(POLL)
        .spawn(),
    ];

    Relay {
        bus,
        storage,
        upstream,
        pool,
        pending,
        gateway,
        consumers,
    }
}

impl Relay {
    async fn query(&self, kind: QueryKind, argument: &str) -> Result<RateReply, RelayError> {
        let body = self.gateway.query(kind, argument).await?;
        Ok(serde_json::from_str(&body).expect("reply body must be the reply JSON"))
    }

    async fn response_count(&self) -> usize {
        self.bus.as_in_memory().unwrap().topic_len(RESPONSE_TOPIC).await
    }

    fn upstream_calls(&self) -> u64 {
        self.upstream.call_count()
    }

    async fn stop(self) {
        for consumer in self.consumers {
            consumer.stop().await;
        }
        self.pool.shutdown().await;
    }
}

fn standard_rates() -> UpstreamRates {
    UpstreamRates::of(
        "EUR",
        "2024-01-15",
        HashMap::from([
            ("USD".to_string(), 1.1),
            ("RUB".to_string(), 100.0),
            ("EUR".to_string(), 1.0),
        ]),
    )
}

fn rates_with_jpy() -> UpstreamRates {
    let mut rates = standard_rates();
    rates.rates.insert("JPY".to_string(), 160.0);
    rates
}

#[tokio::test]
async fn s1_cold_all_populates_cache() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(5)).await;

    let reply = relay.query(QueryKind::All, "").await.unwrap();

    assert_eq!(reply.currency, "ALL");
    assert_eq!(reply.base_currency, "EUR");
    assert_eq!(reply.date, "2024-01-15");
    assert_eq!(reply.rates.len(), 3);
    assert_eq!(reply.rates["USD"], 1.1);
    assert!(Uuid::parse_str(&reply.request_id).is_ok());

    assert_eq!(relay.upstream_calls(), 1);
    let cached = relay.storage.find_reply("ALL").await.unwrap().unwrap();
    assert_eq!(cached.rates.len(), 3);
    assert!(relay
        .storage
        .payload_last_saved("ALL:")
        .await
        .unwrap()
        .is_some());

    relay.stop().await;
}

#[tokio::test]
async fn s2_warm_single_hits_without_upstream() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(5)).await;

    relay.query(QueryKind::All, "").await.unwrap();
    assert_eq!(relay.upstream_calls(), 1);

    let reply = relay.query(QueryKind::Single, "USD").await.unwrap();

    assert_eq!(reply.currency, "USD");
    assert_eq!(reply.rates, HashMap::from([("USD".to_string(), 1.1)]));
    assert_eq!(reply.date, "2024-01-15");
    // Served from the cached ALL row: no further upstream traffic.
    assert_eq!(relay.upstream_calls(), 1);

    relay.stop().await;
}

#[tokio::test]
async fn s3_filter_missing_code_refetches_and_caches_new_row() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(5)).await;

    relay.query(QueryKind::All, "").await.unwrap();
    // The upstream now also quotes JPY.
    relay
        .upstream
        .as_static()
        .unwrap()
        .set_fallback(rates_with_jpy());

    let reply = relay.query(QueryKind::Filter, "USD,JPY").await.unwrap();

    assert_eq!(reply.currency, "USD,JPY");
    assert_eq!(reply.rates.len(), 2);
    assert_eq!(reply.rates["JPY"], 160.0);
    assert_eq!(relay.upstream_calls(), 2);

    let cached = relay.storage.find_reply("USD,JPY").await.unwrap().unwrap();
    assert_eq!(cached.rates.len(), 2);

    relay.stop().await;
}

#[tokio::test]
async fn s4_duplicate_delivery_is_absorbed() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(5)).await;

    // Inject the same request-topic record, fixed rid, twice.
    let rid = Uuid::new_v4();
    let record = BusRecord::for_request(rid, "ALL:");
    relay.bus.publish(REQUEST_TOPIC, record.clone()).await.unwrap();
    relay.bus.publish(REQUEST_TOPIC, record).await.unwrap();

    // Wait for the first delivery to produce its reply, then give the
    // duplicate time to (not) produce another.
    for _ in 0..400 {
        if relay.response_count().await >= 1 {
            break;
        }
        tokio::time::sleep(POLL).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let responses = relay.bus.as_in_memory().unwrap().records(RESPONSE_TOPIC).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].headers.correlation_id(), Some(rid));
    // Exactly one upstream trip: the replay was dropped by the ledger.
    assert_eq!(relay.upstream_calls(), 1);

    relay.stop().await;
}

#[tokio::test]
async fn s5_stale_payload_refreshes_and_overwrites() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(5)).await;

    relay.query(QueryKind::All, "").await.unwrap();
    let first_saved = relay
        .storage
        .payload_last_saved("ALL:")
        .await
        .unwrap()
        .unwrap();

    // Age the ledger row well past the freshness window.
    let aged = first_saved - chrono::Duration::hours(2);
    relay
        .storage
        .as_in_memory()
        .unwrap()
        .age_payload("ALL:", aged)
        .await;
    // Upstream rates moved in the meantime.
    let mut moved = standard_rates();
    moved.rates.insert("USD".to_string(), 1.25);
    relay.upstream.as_static().unwrap().set_fallback(moved);

    let reply = relay.query(QueryKind::All, "").await.unwrap();

    assert_eq!(relay.upstream_calls(), 2);
    assert_eq!(reply.rates["USD"], 1.25);

    let cached = relay.storage.find_reply("ALL").await.unwrap().unwrap();
    assert_eq!(cached.rates["USD"], 1.25);
    let restamped = relay
        .storage
        .payload_last_saved("ALL:")
        .await
        .unwrap()
        .unwrap();
    assert!(restamped > aged);

    relay.stop().await;
}

#[tokio::test(start_paused = true)]
async fn s6_slow_fetch_times_out_and_late_reply_is_discarded() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(10)).await;
    // The fetch side stalls for 15s, past the 10s edge deadline.
    relay
        .upstream
        .as_static()
        .unwrap()
        .set_delay(Duration::from_secs(15));

    let err = relay.query(QueryKind::All, "").await.unwrap_err();
    assert!(matches!(err, RelayError::Timeout { seconds: 10 }));
    assert!(relay.pending.is_empty());

    // Let the late reply land; the listener discards it without panicking.
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(relay.response_count().await, 1);
    assert!(relay.pending.is_empty());

    // The relay still answers once the upstream recovers.
    relay
        .upstream
        .as_static()
        .unwrap()
        .set_delay(Duration::ZERO);
    let reply = relay.query(QueryKind::All, "").await.unwrap();
    assert_eq!(reply.currency, "ALL");

    relay.stop().await;
}

#[tokio::test]
async fn repeated_query_inside_window_is_idempotent() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(5)).await;

    let first = relay.query(QueryKind::Single, "USD").await.unwrap();
    let second = relay.query(QueryKind::Single, "USD").await.unwrap();

    // Identical rates content; only the request id differs.
    assert_eq!(first.rates, second.rates);
    assert_eq!(first.date, second.date);
    assert_eq!(first.base_currency, second.base_currency);
    assert_ne!(first.request_id, second.request_id);

    relay.stop().await;
}

#[tokio::test]
async fn exhausted_upstream_surfaces_as_upstream_error() {
    // A static upstream with no payload fails every attempt.
    let relay = start_relay(
        UpstreamProvider::Static(Default::default()),
        test_config(5),
    )
    .await;

    let err = relay.query(QueryKind::All, "").await.unwrap_err();
    assert!(matches!(err, RelayError::Upstream { .. }));

    // The record was dead-lettered with the upstream reason.
    let dlt = relay
        .bus
        .as_in_memory()
        .unwrap()
        .records(DEAD_LETTER_TOPIC)
        .await;
    assert_eq!(dlt.len(), 1);
    assert!(dlt[0].body.contains("UpstreamUnavailable"));

    relay.stop().await;
}

#[tokio::test]
async fn unknown_filter_code_dead_letters_and_edge_times_out() {
    let relay = start_relay(UpstreamProvider::new_static(standard_rates()), test_config(2)).await;

    // XAU is valid by format but the upstream does not quote it.
    let err = relay.query(QueryKind::Filter, "USD,XAU").await.unwrap_err();
    assert!(matches!(err, RelayError::Timeout { .. }));

    let dlt = relay
        .bus
        .as_in_memory()
        .unwrap()
        .records(DEAD_LETTER_TOPIC)
        .await;
    assert_eq!(dlt.len(), 1);
    assert!(dlt[0].body.contains("UnknownCode"));

    relay.stop().await;
}
