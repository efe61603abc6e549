//! # In-Memory Bus
//!
//! Thread-safe in-memory broker for tests and local development.
//!
//! - Per-topic append-only record log; a publish commits exactly one record
//!   under the write lock (the in-memory rendition of a transactional send).
//! - Per-(topic, group) cursors; a fresh group starts at offset zero, which
//!   replays everything still in the log (auto-offset `earliest`).
//! - A fencing switch: once fenced, every publish fails with
//!   [`MessagingError::ProducerFenced`] until unfenced. Used to exercise the
//!   fenced-producer path in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::messaging::envelope::BusRecord;
use crate::messaging::errors::{MessagingError, MessagingResult};

#[derive(Debug, Default)]
struct InMemoryTopic {
    /// Append-only log of records.
    records: Vec<BusRecord>,
    /// Next offset to hand out, per consumer group.
    cursors: HashMap<String, usize>,
}

/// In-memory bus provider.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    topics: RwLock<HashMap<String, InMemoryTopic>>,
    fenced: AtomicBool,
    total_published: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic if it does not exist (idempotent).
    pub async fn ensure_topic(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_string()).or_default();
    }

    /// Commit one record to a topic. Topics are created on first publish.
    pub async fn publish(&self, topic: &str, record: BusRecord) -> MessagingResult<()> {
        if self.fenced.load(Ordering::Acquire) {
            return Err(MessagingError::producer_fenced(format!(
                "producer for {topic} fenced by a newer instance"
            )));
        }

        let mut topics = self.topics.write().await;
        let entry = topics.entry(topic.to_string()).or_default();
        entry.records.push(record);
        self.total_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Read up to `max` records for a consumer group, advancing its cursor.
    ///
    /// A group never sees the same offset twice; redelivery of a logical
    /// request is the dedup ledger's concern, not the broker's.
    pub async fn poll(
        &self,
        topic: &str,
        group: &str,
        max: usize,
    ) -> MessagingResult<Vec<BusRecord>> {
        let mut topics = self.topics.write().await;
        let entry = topics
            .get_mut(topic)
            .ok_or_else(|| MessagingError::topic_not_found(topic))?;

        let cursor = entry.cursors.entry(group.to_string()).or_insert(0);
        let available = entry.records.len().saturating_sub(*cursor);
        let take = available.min(max);
        let batch = entry.records[*cursor..*cursor + take].to_vec();
        *cursor += take;
        Ok(batch)
    }

    /// Number of records ever published to a topic (for tests).
    pub async fn topic_len(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map(|t| t.records.len()).unwrap_or(0)
    }

    /// Snapshot of every record on a topic (for tests).
    pub async fn records(&self, topic: &str) -> Vec<BusRecord> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|t| t.records.clone())
            .unwrap_or_default()
    }

    /// Fence the producer: subsequent publishes fail with `ProducerFenced`.
    pub fn fence(&self) {
        self.fenced.store(true, Ordering::Release);
    }

    /// Lift the fence.
    pub fn unfence(&self) {
        self.fenced.store(false, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        !self.fenced.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_and_poll_by_group() {
        let bus = InMemoryBus::new();
        bus.ensure_topic("request-currency-topic").await;

        let rid = Uuid::new_v4();
        bus.publish("request-currency-topic", BusRecord::for_request(rid, "ALL:"))
            .await
            .unwrap();

        let batch = bus
            .poll("request-currency-topic", "group-a", 10)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].headers.message_key(), Some(rid));

        // The cursor advanced; the same group sees nothing more.
        let batch = bus
            .poll("request-currency-topic", "group-a", 10)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn fresh_group_replays_from_earliest() {
        let bus = InMemoryBus::new();
        bus.publish("t", BusRecord::new(None, "first")).await.unwrap();
        bus.publish("t", BusRecord::new(None, "second")).await.unwrap();

        // group-a consumes both before group-b even exists.
        let batch = bus.poll("t", "group-a", 10).await.unwrap();
        assert_eq!(batch.len(), 2);

        // A cold-started group still replays the full log.
        let batch = bus.poll("t", "group-b", 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].body, "first");
    }

    #[tokio::test]
    async fn poll_respects_max() {
        let bus = InMemoryBus::new();
        for i in 0..5 {
            bus.publish("t", BusRecord::new(None, format!("m{i}")))
                .await
                .unwrap();
        }
        let batch = bus.poll("t", "g", 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        let batch = bus.poll("t", "g", 10).await.unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test]
    async fn poll_unknown_topic_errors() {
        let bus = InMemoryBus::new();
        let err = bus.poll("missing", "g", 1).await.unwrap_err();
        assert!(matches!(err, MessagingError::TopicNotFound { .. }));
    }

    #[tokio::test]
    async fn fenced_producer_rejects_publishes() {
        let bus = InMemoryBus::new();
        bus.fence();
        let err = bus
            .publish("t", BusRecord::new(None, "doomed"))
            .await
            .unwrap_err();
        assert!(err.is_fenced());
        assert!(!bus.is_healthy());

        bus.unfence();
        bus.publish("t", BusRecord::new(None, "fine")).await.unwrap();
        assert_eq!(bus.topic_len("t").await, 1);
    }
}
