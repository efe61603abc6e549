//! # Edge HTTP Surface
//!
//! Axum routes mapping URL paths onto the gateway's single `query`
//! operation, plus a health probe. The success body keeps the legacy
//! framing byte-for-byte for wire compatibility with existing front-ends.

pub mod errors;
pub mod handlers;
pub mod state;

pub use errors::ApiError;
pub use handlers::router;
pub use state::AppState;
