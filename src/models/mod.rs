//! Domain models: the query envelope carried on the request/fetch topics and
//! the reply record carried on the response topic.

pub mod query;
pub mod rate_reply;

pub use query::{CurrencyQuery, QueryKind};
pub use rate_reply::RateReply;
