//! # currency-relay
//!
//! Synchronous-over-asynchronous request/response correlator for currency
//! exchange rates, layered on a publish/subscribe bus.
//!
//! An HTTP edge translates each inbound query into a bus message tagged with
//! a freshly minted correlation id, suspends the caller on a pending slot,
//! and resumes it when a matching reply arrives on the response topic, or
//! times out. Behind the bus, a processing tier resolves each request against
//! a freshness-aware durable cache; stale or unknown queries are forwarded to
//! a fetch tier that contacts the upstream exchange-rates API, persists the
//! result, and replies. A deduplication ledger of seen correlation ids with
//! scheduled expiration sweeps gives at-most-once handling of duplicate
//! deliveries.
//!
//! ## Subsystems
//!
//! - [`messaging`]: provider-agnostic bus adapter (topics, headers,
//!   transactional publish, dead-letter helper, consumer loops)
//! - [`executor`]: bounded worker pool with abort rejection and monitoring
//! - [`correlator`]: pending-request registry and edge gateway semantics
//! - [`engine`]: request-side and fetch-side handlers (cache & freshness)
//! - [`storage`]: payload ledger, cached replies, and the dedup ledger
//! - [`dedup`]: scheduled expiration sweeps over the dedup ledger
//! - [`upstream`]: retrying client for the exchange-rates API
//! - [`web`]: axum HTTP surface for the edge

pub mod config;
pub mod constants;
pub mod correlator;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod storage;
pub mod upstream;
pub mod web;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.edge.request_timeout_sec, 10);
        assert_eq!(config.cache.freshness_sec, 3600);
    }
}
