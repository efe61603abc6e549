//! # Cache & Freshness Engine
//!
//! The processing tier behind the bus, split into two handlers driven by
//! their own consumer groups:
//!
//! - [`RequestSideHandler`] (inbound `request-currency-topic`): dedup
//!   check, freshness decision, cache read, and the fan-out to the fetch
//!   topic on a miss
//! - [`FetchSideHandler`] (inbound `fetch-currency-topic`): retrying
//!   upstream call, projection, transactional upsert, reply publish
//!
//! Per request the state machine is: *Admitted → Published(request) →
//! {DuplicateDropped | CacheHit | Republished(fetch) → Fetched →
//! CachePublished}*, with dead-letter records and synthetic error replies
//! on the failure edges.

pub mod fetch_handler;
pub mod request_handler;

use std::future::Future;

use tracing::warn;

use crate::storage::{StorageError, StorageResult};

pub use fetch_handler::FetchSideHandler;
pub use request_handler::RequestSideHandler;

/// Run a storage operation, retrying once on failure.
///
/// The second failure is returned to the caller, which dead-letters the
/// record and publishes a synthetic error reply.
pub(crate) async fn retry_storage_once<T, Fut, F>(operation: &str, make: F) -> StorageResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    match make().await {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(operation, error = %first, "storage operation failed, retrying once");
            make().await.map_err(|second| {
                StorageError::query(operation, format!("retry failed: {second} (first: {first})"))
            })
        }
    }
}
