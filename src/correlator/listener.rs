//! # Response Listener
//!
//! Consumes the response topic in the edge's consumer group. Each record's
//! `correlationId` header selects a pending slot, which is atomically
//! removed and completed with the body. Records without a matching slot
//! (late replies after a timeout, replies meant for another edge process)
//! are acknowledged and discarded; that path is normal and never errors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::constants::ERROR_BODY_PREFIX;
use crate::correlator::pending::{PendingOutcome, PendingRequests};
use crate::error::RelayError;
use crate::messaging::{BusRecord, RecordHandler};

/// Handler completing pending slots from response records.
#[derive(Debug)]
pub struct ResponseListener {
    pending: Arc<PendingRequests>,
}

impl ResponseListener {
    pub fn new(pending: Arc<PendingRequests>) -> Self {
        Self { pending }
    }
}

#[async_trait]
impl RecordHandler for ResponseListener {
    fn name(&self) -> &'static str {
        "response-listener"
    }

    async fn handle(&self, record: BusRecord) {
        let Some(rid) = record.headers.correlation_id() else {
            warn!(body = %record.body, "response record without correlationId header");
            return;
        };

        let outcome = match record.body.strip_prefix(ERROR_BODY_PREFIX) {
            Some(message) => PendingOutcome::Failed(RelayError::upstream(message)),
            None => PendingOutcome::Reply(record.body),
        };

        if self.pending.complete(rid, outcome) {
            debug!(rid = %rid, "pending slot completed");
        } else {
            debug!(rid = %rid, "reply without pending slot discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::error_body;
    use uuid::Uuid;

    #[tokio::test]
    async fn reply_completes_matching_slot() {
        let pending = Arc::new(PendingRequests::new());
        let listener = ResponseListener::new(Arc::clone(&pending));
        let rid = Uuid::new_v4();
        let rx = pending.insert(rid);

        listener
            .handle(BusRecord::for_response(rid, "{\"rates\":{}}"))
            .await;

        match rx.await.unwrap() {
            PendingOutcome::Reply(body) => assert_eq!(body, "{\"rates\":{}}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_body_completes_exceptionally() {
        let pending = Arc::new(PendingRequests::new());
        let listener = ResponseListener::new(Arc::clone(&pending));
        let rid = Uuid::new_v4();
        let rx = pending.insert(rid);

        listener
            .handle(BusRecord::for_response(rid, error_body("rates api down")))
            .await;

        match rx.await.unwrap() {
            PendingOutcome::Failed(RelayError::Upstream { message }) => {
                assert_eq!(message, "rates api down");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_reply_is_discarded_without_panic() {
        let pending = Arc::new(PendingRequests::new());
        let listener = ResponseListener::new(Arc::clone(&pending));

        // No slot exists for this rid.
        listener
            .handle(BusRecord::for_response(Uuid::new_v4(), "late"))
            .await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn record_without_correlation_header_is_ignored() {
        let pending = Arc::new(PendingRequests::new());
        let listener = ResponseListener::new(Arc::clone(&pending));
        let rid = Uuid::new_v4();
        let _rx = pending.insert(rid);

        listener.handle(BusRecord::new(None, "headerless")).await;
        // The slot is untouched.
        assert_eq!(pending.len(), 1);
    }
}
