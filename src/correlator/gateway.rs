//! # Query Gateway
//!
//! The edge's one public operation: `query(kind, argument)`. Admits an
//! external request, publishes it on the request topic under a fresh
//! correlation id, and suspends the caller on a pending slot until the
//! matching reply arrives or the deadline passes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EdgeConfig;
use crate::constants::REQUEST_TOPIC;
use crate::correlator::pending::{PendingOutcome, PendingRequests};
use crate::error::{RelayError, RelayResult};
use crate::executor::WorkerPool;
use crate::messaging::{BusProvider, BusRecord};
use crate::models::{CurrencyQuery, QueryKind};

/// Edge gateway translating external queries into correlated bus traffic.
#[derive(Debug, Clone)]
pub struct QueryGateway {
    bus: Arc<BusProvider>,
    pool: Arc<WorkerPool>,
    pending: Arc<PendingRequests>,
    deadline: Duration,
}

impl QueryGateway {
    pub fn new(
        bus: Arc<BusProvider>,
        pool: Arc<WorkerPool>,
        pending: Arc<PendingRequests>,
        edge: &EdgeConfig,
    ) -> Self {
        Self {
            bus,
            pool,
            pending,
            deadline: edge.request_timeout(),
        }
    }

    /// Run one query end to end. Returns the reply body as received on the
    /// response topic, or:
    ///
    /// - [`RelayError::InvalidRequest`] when the argument does not match the
    ///   kind
    /// - [`RelayError::Overloaded`] when the worker pool rejects the publish
    /// - [`RelayError::Timeout`] when the deadline elapses
    /// - [`RelayError::Upstream`] / [`RelayError::Fenced`] when the slot is
    ///   completed exceptionally
    pub async fn query(&self, kind: QueryKind, argument: &str) -> RelayResult<String> {
        let query = CurrencyQuery::new(kind, argument)?;
        let rid = Uuid::new_v4();
        let receiver = self.pending.insert(rid);

        info!(rid = %rid, body = %query.envelope(), "query admitted");

        let bus = Arc::clone(&self.bus);
        let pending = Arc::clone(&self.pending);
        let envelope = query.envelope();
        let publish = async move {
            let record = BusRecord::for_request(rid, envelope);
            if let Err(err) = bus.publish(REQUEST_TOPIC, record).await {
                error!(rid = %rid, error = %err, "publish to request topic failed");
                let failure = if err.is_fenced() {
                    RelayError::fenced(err.to_string())
                } else {
                    // A rejected publish is an overload condition, same as a
                    // pool rejection.
                    RelayError::overloaded(format!("bus publish failed: {err}"))
                };
                pending.complete(rid, PendingOutcome::Failed(failure));
            }
        };

        if let Err(err) = self.pool.submit(publish) {
            warn!(rid = %rid, error = %err, "publish task rejected");
            self.pending.remove(rid);
            return Err(err);
        }

        self.await_outcome(rid, receiver).await
    }

    /// Number of callers currently suspended on a pending slot.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn await_outcome(
        &self,
        rid: Uuid,
        receiver: tokio::sync::oneshot::Receiver<PendingOutcome>,
    ) -> RelayResult<String> {
        match tokio::time::timeout(self.deadline, receiver).await {
            Ok(Ok(PendingOutcome::Reply(body))) => Ok(body),
            Ok(Ok(PendingOutcome::Failed(err))) => Err(err),
            Ok(Err(_)) => {
                // The sender vanished without completing; treat as internal.
                self.pending.remove(rid);
                Err(RelayError::internal(format!(
                    "pending slot for {rid} dropped without completion"
                )))
            }
            Err(_) => {
                self.pending.remove(rid);
                warn!(rid = %rid, "query deadline elapsed");
                Err(RelayError::timeout(self.deadline.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::constants::HEADER_MESSAGE_KEY;

    fn harness() -> (Arc<BusProvider>, Arc<WorkerPool>, Arc<PendingRequests>) {
        let bus = Arc::new(BusProvider::new_in_memory());
        let pool = WorkerPool::start(&PoolConfig::default());
        let pending = Arc::new(PendingRequests::new());
        (bus, pool, pending)
    }

    fn edge_with_timeout(seconds: u64) -> EdgeConfig {
        EdgeConfig {
            request_timeout_sec: seconds,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_argument_fails_before_any_publish() {
        let (bus, pool, pending) = harness();
        let gateway = QueryGateway::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            pending,
            &edge_with_timeout(1),
        );

        let err = gateway.query(QueryKind::Single, "usd").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidRequest { .. }));
        assert_eq!(bus.as_in_memory().unwrap().topic_len(REQUEST_TOPIC).await, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn query_publishes_with_rid_header_and_times_out() {
        let (bus, pool, pending) = harness();
        let gateway = QueryGateway::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::clone(&pending),
            &edge_with_timeout(1),
        );

        let err = gateway.query(QueryKind::All, "").await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout { .. }));
        // The slot was reclaimed on the timeout path.
        assert!(pending.is_empty());

        let records = bus.as_in_memory().unwrap().records(REQUEST_TOPIC).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body, "ALL:");
        assert!(records[0].headers.get(HEADER_MESSAGE_KEY).is_some());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn fenced_publish_completes_slot_exceptionally() {
        let (bus, pool, pending) = harness();
        bus.as_in_memory().unwrap().fence();
        let gateway = QueryGateway::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::clone(&pending),
            &edge_with_timeout(5),
        );

        let err = gateway.query(QueryKind::All, "").await.unwrap_err();
        assert!(matches!(err, RelayError::Fenced { .. }));
        assert!(pending.is_empty());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn reply_resumes_the_caller() {
        let (bus, pool, pending) = harness();
        let gateway = QueryGateway::new(
            Arc::clone(&bus),
            Arc::clone(&pool),
            Arc::clone(&pending),
            &edge_with_timeout(5),
        );

        let responder_pending = Arc::clone(&pending);
        let responder_bus = Arc::clone(&bus);
        let responder = tokio::spawn(async move {
            // Wait for the request record, then complete its slot directly.
            loop {
                let records = responder_bus
                    .as_in_memory()
                    .unwrap()
                    .records(REQUEST_TOPIC)
                    .await;
                if let Some(record) = records.first() {
                    let rid = record.headers.message_key().unwrap();
                    responder_pending
                        .complete(rid, PendingOutcome::Reply("{\"ok\":true}".to_string()));
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let body = gateway.query(QueryKind::Single, "USD").await.unwrap();
        assert_eq!(body, "{\"ok\":true}");
        responder.await.unwrap();
        pool.shutdown().await;
    }
}
