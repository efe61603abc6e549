//! Shared literals for topics, headers, consumer groups, and wire framing.
//!
//! Everything that must match byte-for-byte across processes lives here so a
//! rename cannot silently split producers from consumers.

/// Topic carrying freshly admitted queries from the edge.
pub const REQUEST_TOPIC: &str = "request-currency-topic";

/// Topic carrying cache misses and stale queries to the fetch tier.
pub const FETCH_TOPIC: &str = "fetch-currency-topic";

/// Topic carrying serialized replies back to the edge.
pub const RESPONSE_TOPIC: &str = "response-topic";

/// Destination for records that cannot be processed.
pub const DEAD_LETTER_TOPIC: &str = "dead-letter-topic";

/// Header stamped on every hop; holds the correlation id.
pub const HEADER_MESSAGE_KEY: &str = "messageKey";

/// Header added on the response path; duplicates the correlation id.
pub const HEADER_CORRELATION_ID: &str = "correlationId";

/// Consumer group used by the edge's response listener.
pub const EDGE_GROUP: &str = "relay-edge-group";

/// Consumer group of the request-side engine handler.
pub const REQUEST_GROUP: &str = "currency-request-group";

/// Consumer group of the fetch-side engine handler.
pub const FETCH_GROUP: &str = "currency-fetch-group";

/// Prefix of the HTTP success body. Preserved byte-for-byte for wire
/// compatibility with existing front-ends.
pub const REPLY_PREFIX: &str = "По заданным параметрам успешно получен ответ : ";

/// Prefix marking a synthetic error body on the response topic. The edge's
/// response listener completes the pending slot exceptionally when it sees it.
pub const ERROR_BODY_PREFIX: &str = "Error: ";

/// Dead-letter reasons.
pub mod dlt_reason {
    pub const MISSING_CORRELATION: &str = "MissingCorrelation";
    pub const UNRECOGNISED: &str = "Unrecognised";
    pub const UNKNOWN_CODE: &str = "UnknownCode";
    pub const UPSTREAM_UNAVAILABLE: &str = "UpstreamUnavailable";
    pub const STORAGE_FAILURE: &str = "StorageFailure";
}

/// Format the body of a dead-letter record.
pub fn dead_letter_body(reason: &str, original: &str) -> String {
    format!("Reason: {reason}, Message: {original}")
}

/// Format a synthetic error body for the response topic.
pub fn error_body(message: &str) -> String {
    format!("{ERROR_BODY_PREFIX}{message}")
}
