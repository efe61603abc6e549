//! Error types for the bus adapter.

use thiserror::Error;

/// Failures raised by bus providers.
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Topic not found: {topic}")]
    TopicNotFound { topic: String },

    #[error("Publish to {topic} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Poll on {topic} failed: {message}")]
    Poll { topic: String, message: String },

    /// The transactional producer was fenced by a newer instance. Fatal for
    /// the current worker; callers must complete the affected pending slot
    /// exceptionally and let the record be re-consumed after rebalance.
    #[error("Producer fenced: {message}")]
    ProducerFenced { message: String },

    #[error("Record serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn topic_not_found(topic: impl Into<String>) -> Self {
        Self::TopicNotFound {
            topic: topic.into(),
        }
    }

    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn poll(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Poll {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn producer_fenced(message: impl Into<String>) -> Self {
        Self::ProducerFenced {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this failure means the producer must not retry.
    pub fn is_fenced(&self) -> bool {
        matches!(self, Self::ProducerFenced { .. })
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::serialization(err.to_string())
    }
}

/// Result type alias for bus operations.
pub type MessagingResult<T> = Result<T, MessagingError>;
