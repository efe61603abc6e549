//! # Bounded Worker Pool
//!
//! Concurrent task executor dispatching bus sends and per-record handler
//! work: FIFO queue, bounded worker set with an idle reaper, abort rejection
//! when the queue is full, periodic monitoring, and a graceful drain on
//! shutdown.

pub mod pool;

pub use pool::{PoolSnapshot, WorkerPool};
