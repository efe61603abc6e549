//! Error types for the durable stores.

use thiserror::Error;

/// Failures raised by storage providers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection error: {message}")]
    Connection { message: String },

    #[error("Query '{operation}' failed: {message}")]
    Query { operation: String, message: String },

    #[error("Internal storage error: {message}")]
    Internal { message: String },
}

impl StorageError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach an operation name to a raw sqlx failure.
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::connection(format!("{operation}: {err}"))
            }
            other => Self::query(operation, other.to_string()),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
