//! # Durable Stores
//!
//! The three stores owned by the processing tier:
//!
//! - **payload ledger**: `payload_table(payload PK, last_save_payload)`,
//!   driving the freshness decision
//! - **reply store**: `response_record` + `exchange_rates`, the cached
//!   replies keyed by the query argument
//! - **dedup ledger**: `request_ids(request_id PK, expiration_date,
//!   created_at)`, giving at-most-once handling of duplicate deliveries
//!
//! All three sit behind [`StorageProvider`], an enum over a PostgreSQL
//! backend (sqlx) and an in-memory backend for tests, mirroring the bus
//! adapter seam.

pub mod errors;
pub mod provider;
pub mod providers;

pub use errors::{StorageError, StorageResult};
pub use provider::{DedupEntry, StorageProvider};
pub use providers::{InMemoryStore, PostgresStore};
