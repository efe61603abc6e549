//! # Relay Error Types
//!
//! Top-level error taxonomy for the relay, built with thiserror. Subsystems
//! keep their own error enums ([`crate::messaging::MessagingError`],
//! [`crate::storage::StorageError`]) and convert into [`RelayError`] at the
//! boundaries where a caller-visible outcome is produced.

use thiserror::Error;

use crate::messaging::MessagingError;
use crate::storage::StorageError;

/// Errors surfaced by the relay to its callers.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed edge input; reported locally as HTTP 400.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Worker pool or bus publish rejection; HTTP 503, no dead letter.
    #[error("Overloaded: {message}")]
    Overloaded { message: String },

    /// Edge deadline exceeded; HTTP 504.
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The processing tier relayed an upstream failure; HTTP 502.
    #[error("Upstream failure: {message}")]
    Upstream { message: String },

    /// Bus record whose body cannot be interpreted. Dead-lettered; the edge
    /// observes this as a timeout.
    #[error("Unrecognised message: {message}")]
    Unrecognised { message: String },

    /// Bus record without a correlation header. Dead-lettered.
    #[error("Message is missing its correlation header")]
    MissingCorrelation,

    /// A requested currency code is absent from the upstream response.
    #[error("Unknown currency code: {code}")]
    UnknownCode { code: String },

    /// Upstream retries exhausted.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Database insert/update/query failure.
    #[error("Storage failure during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// Transactional producer fenced by a newer instance. Fatal for the
    /// current worker; the pending slot is completed exceptionally.
    #[error("Producer fenced: {message}")]
    Fenced { message: String },

    /// Bus adapter failure not covered by a more specific kind.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Invalid or unloadable configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Catch-all for internal invariant violations.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RelayError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::Overloaded {
            message: message.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn unrecognised(message: impl Into<String>) -> Self {
        Self::Unrecognised {
            message: message.into(),
        }
    }

    pub fn unknown_code(code: impl Into<String>) -> Self {
        Self::UnknownCode { code: code.into() }
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn fenced(message: impl Into<String>) -> Self {
        Self::Fenced {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query { operation, message } => RelayError::Storage { operation, message },
            other => RelayError::Storage {
                operation: "storage".to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::internal(format!("JSON serialization error: {err}"))
    }
}

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
