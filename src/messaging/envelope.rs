//! Bus record and header structures.
//!
//! Every hop of a logical request carries the correlation id in the
//! `messageKey` header; the response path duplicates it as `correlationId`.

use std::collections::HashMap;

use uuid::Uuid;

use crate::constants::{HEADER_CORRELATION_ID, HEADER_MESSAGE_KEY};

/// String headers attached to a bus record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusHeaders {
    inner: HashMap<String, String>,
}

impl BusHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    /// The correlation id from the `messageKey` header, if present and
    /// well-formed.
    pub fn message_key(&self) -> Option<Uuid> {
        self.get(HEADER_MESSAGE_KEY)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// The correlation id from the `correlationId` header, if present and
    /// well-formed.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.get(HEADER_CORRELATION_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// One record on a topic: key, body, headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    /// Partitioning key; the correlation id on every relay topic.
    pub key: Option<String>,
    /// UTF-8 body.
    pub body: String,
    pub headers: BusHeaders,
}

impl BusRecord {
    /// A bare record with no headers.
    pub fn new(key: Option<String>, body: impl Into<String>) -> Self {
        Self {
            key,
            body: body.into(),
            headers: BusHeaders::new(),
        }
    }

    /// A request/fetch record: keyed by the rid, `messageKey` header set.
    pub fn for_request(rid: Uuid, body: impl Into<String>) -> Self {
        let mut headers = BusHeaders::new();
        headers.insert(HEADER_MESSAGE_KEY, rid.to_string());
        Self {
            key: Some(rid.to_string()),
            body: body.into(),
            headers,
        }
    }

    /// A response record: keyed by the rid, with both `messageKey` and
    /// `correlationId` headers set.
    pub fn for_response(rid: Uuid, body: impl Into<String>) -> Self {
        let mut record = Self::for_request(rid, body);
        record
            .headers
            .insert(HEADER_CORRELATION_ID, rid.to_string());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_record_carries_message_key() {
        let rid = Uuid::new_v4();
        let record = BusRecord::for_request(rid, "ALL:");

        assert_eq!(record.key.as_deref(), Some(rid.to_string().as_str()));
        assert_eq!(record.headers.message_key(), Some(rid));
        assert_eq!(record.headers.correlation_id(), None);
        assert_eq!(record.body, "ALL:");
    }

    #[test]
    fn response_record_carries_both_headers() {
        let rid = Uuid::new_v4();
        let record = BusRecord::for_response(rid, "{}");

        assert_eq!(record.headers.message_key(), Some(rid));
        assert_eq!(record.headers.correlation_id(), Some(rid));
    }

    #[test]
    fn malformed_header_value_reads_as_absent() {
        let mut headers = BusHeaders::new();
        headers.insert(HEADER_MESSAGE_KEY, "not-a-uuid");
        assert_eq!(headers.message_key(), None);
    }
}
