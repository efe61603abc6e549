//! # Correlator
//!
//! The edge half of the relay: a process-wide registry of pending requests
//! keyed by correlation id, the gateway that admits external queries and
//! suspends callers, and the response listener that resumes them.

pub mod gateway;
pub mod listener;
pub mod pending;

pub use gateway::QueryGateway;
pub use listener::ResponseListener;
pub use pending::{PendingOutcome, PendingRequests};
