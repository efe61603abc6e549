//! # Bus Provider
//!
//! Enum dispatch over concrete bus backends, no trait objects. Call sites
//! hold an `Arc<BusProvider>` and stay unchanged when a production broker
//! variant is added.

use tracing::info;
use uuid::Uuid;

use crate::constants::{dead_letter_body, DEAD_LETTER_TOPIC};
use crate::messaging::envelope::BusRecord;
use crate::messaging::errors::MessagingResult;
use crate::messaging::providers::InMemoryBus;

/// The configured bus backend.
#[derive(Debug)]
pub enum BusProvider {
    InMemory(InMemoryBus),
}

impl BusProvider {
    /// A fresh in-memory bus.
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryBus::new())
    }

    /// Create the given topics if they do not exist (idempotent).
    pub async fn ensure_topics(&self, topics: &[&str]) -> MessagingResult<()> {
        match self {
            Self::InMemory(bus) => {
                for topic in topics {
                    bus.ensure_topic(topic).await;
                }
                Ok(())
            }
        }
    }

    /// Transactionally commit one record to a topic.
    ///
    /// Either exactly one record is appended or an error is returned; a
    /// [`crate::messaging::MessagingError::ProducerFenced`] failure is
    /// terminal for the caller's producer identity and must be surfaced as
    /// an exceptional completion of the corresponding pending slot.
    pub async fn publish(&self, topic: &str, record: BusRecord) -> MessagingResult<()> {
        match self {
            Self::InMemory(bus) => bus.publish(topic, record).await,
        }
    }

    /// Read up to `max` records for a consumer group. Fresh groups start
    /// from the earliest retained record.
    pub async fn poll(
        &self,
        topic: &str,
        group: &str,
        max: usize,
    ) -> MessagingResult<Vec<BusRecord>> {
        match self {
            Self::InMemory(bus) => bus.poll(topic, group, max).await,
        }
    }

    /// Publish a malformed record to the dead-letter topic with the literal
    /// `"Reason: <reason>, Message: <original body>"` body.
    pub async fn dead_letter(
        &self,
        rid: Option<Uuid>,
        reason: &str,
        original_body: &str,
    ) -> MessagingResult<()> {
        let key = rid.map(|r| r.to_string());
        let record = BusRecord::new(key, dead_letter_body(reason, original_body));
        info!(reason = %reason, "dead-lettering record");
        self.publish(DEAD_LETTER_TOPIC, record).await
    }

    pub async fn health_check(&self) -> bool {
        match self {
            Self::InMemory(bus) => bus.is_healthy(),
        }
    }

    /// Provider name for logging and metrics.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in_memory",
        }
    }

    /// Access the in-memory backend (test hooks: fencing, log inspection).
    pub fn as_in_memory(&self) -> Option<&InMemoryBus> {
        match self {
            Self::InMemory(bus) => Some(bus),
        }
    }
}
