//! # Query Envelope
//!
//! A bus message body is the literal string `"<kind>:<argument>"` with
//! `kind ∈ {ALL, SINGLE, FILTER}`. The payload text is treated verbatim as
//! the payload-ledger key (order-sensitive), while the parsed code *set*
//! drives containment checks against cached replies.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{RelayError, RelayResult};

/// Kind of a currency query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Every rate the upstream knows.
    All,
    /// One three-letter code.
    Single,
    /// A comma-separated list of three-letter codes.
    Filter,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::All => "ALL",
            QueryKind::Single => "SINGLE",
            QueryKind::Filter => "FILTER",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated currency query.
///
/// The argument is kept exactly as supplied; it doubles as the cache key for
/// the reply store (`"ALL"` for [`QueryKind::All`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyQuery {
    kind: QueryKind,
    argument: String,
}

impl CurrencyQuery {
    /// Build a query from its parts, validating the argument against the kind:
    /// empty for ALL, one `[A-Z]{3}` code for SINGLE, comma-separated
    /// `[A-Z]{3}` tokens for FILTER.
    pub fn new(kind: QueryKind, argument: &str) -> RelayResult<Self> {
        let argument = argument.trim();
        match kind {
            QueryKind::All => {
                if !argument.is_empty() {
                    return Err(RelayError::invalid_request(format!(
                        "ALL takes no argument, got '{argument}'"
                    )));
                }
            }
            QueryKind::Single => {
                if !is_currency_code(argument) {
                    return Err(RelayError::invalid_request(format!(
                        "'{argument}' is not a three-letter currency code"
                    )));
                }
            }
            QueryKind::Filter => {
                if argument.is_empty() {
                    return Err(RelayError::invalid_request(
                        "FILTER requires at least one currency code",
                    ));
                }
                for token in argument.split(',') {
                    if !is_currency_code(token.trim()) {
                        return Err(RelayError::invalid_request(format!(
                            "'{}' is not a three-letter currency code",
                            token.trim()
                        )));
                    }
                }
            }
        }
        Ok(Self {
            kind,
            argument: argument.to_string(),
        })
    }

    /// Parse a message body of the form `"<kind>:<argument>"`.
    pub fn parse(body: &str) -> RelayResult<Self> {
        let Some((prefix, argument)) = body.split_once(':') else {
            return Err(RelayError::unrecognised(format!(
                "message has no kind prefix: {body}"
            )));
        };
        let kind = match prefix {
            "ALL" => QueryKind::All,
            "SINGLE" => QueryKind::Single,
            "FILTER" => QueryKind::Filter,
            other => {
                return Err(RelayError::unrecognised(format!(
                    "unknown message kind: {other}"
                )))
            }
        };
        Self::new(kind, argument).map_err(|e| match e {
            // A malformed bus record is Unrecognised, not InvalidRequest:
            // the edge already validated its own input.
            RelayError::InvalidRequest { message } => RelayError::unrecognised(message),
            other => other,
        })
    }

    /// Whether a body carries one of the three recognised prefixes.
    pub fn has_known_prefix(body: &str) -> bool {
        body.starts_with("ALL:") || body.starts_with("SINGLE:") || body.starts_with("FILTER:")
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// The verbatim argument (`""` for ALL).
    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// The wire body, `"<kind>:<argument>"`.
    pub fn envelope(&self) -> String {
        format!("{}:{}", self.kind, self.argument)
    }

    /// The key under which a reply for this query is cached. ALL uses the
    /// literal `"ALL"`; the other kinds use the argument text.
    pub fn cache_key(&self) -> String {
        match self.kind {
            QueryKind::All => "ALL".to_string(),
            _ => self.argument.clone(),
        }
    }

    /// The set of requested codes. Empty for ALL (meaning: everything).
    pub fn code_set(&self) -> BTreeSet<String> {
        match self.kind {
            QueryKind::All => BTreeSet::new(),
            _ => self
                .argument
                .split(',')
                .map(|code| code.trim().to_string())
                .collect(),
        }
    }
}

/// `[A-Z]{3}`, latin uppercase only.
pub fn is_currency_code(token: &str) -> bool {
    token.len() == 3 && token.chars().all(|c| c.is_ascii_uppercase())
}
