//! # Rate Reply
//!
//! The record published on the response topic and persisted in the reply
//! store. Wire shape:
//!
//! ```json
//! {
//!   "rates": { "USD": 1.1, "EUR": 1.0 },
//!   "baseCurrency": "EUR",
//!   "date": "2024-01-15",
//!   "currency": "ALL",
//!   "requestId": "b2f7..."
//! }
//! ```

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reply keyed by the query argument it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateReply {
    /// Currency code to exchange rate, relative to [`Self::base_currency`].
    pub rates: HashMap<String, f64>,
    /// Base currency the rates are quoted against.
    #[serde(rename = "baseCurrency")]
    pub base_currency: String,
    /// Quote date as returned by the upstream, `YYYY-MM-DD`.
    pub date: String,
    /// The echoed query argument (`"ALL"` or the code list).
    pub currency: String,
    /// Correlation id of the writer that produced this reply.
    #[serde(rename = "requestId")]
    pub request_id: String,
}

impl RateReply {
    pub fn new(
        rates: HashMap<String, f64>,
        base_currency: impl Into<String>,
        date: impl Into<String>,
        currency: impl Into<String>,
        request_id: Uuid,
    ) -> Self {
        Self {
            rates,
            base_currency: base_currency.into(),
            date: date.into(),
            currency: currency.into(),
            request_id: request_id.to_string(),
        }
    }

    /// Whether this reply covers every requested code. An empty request set
    /// (an ALL query) is covered by construction.
    pub fn contains_codes(&self, requested: &BTreeSet<String>) -> bool {
        requested.iter().all(|code| self.rates.contains_key(code))
    }

    /// Project the reply down to the requested codes, stamping the current
    /// correlation id. An empty set keeps every rate (ALL semantics).
    ///
    /// Callers must have checked [`Self::contains_codes`] first; unknown
    /// codes are silently absent from the projection.
    pub fn project(&self, requested: &BTreeSet<String>, request_id: Uuid) -> Self {
        let rates = if requested.is_empty() {
            self.rates.clone()
        } else {
            self.rates
                .iter()
                .filter(|(code, _)| requested.contains(*code))
                .map(|(code, rate)| (code.clone(), *rate))
                .collect()
        };
        Self {
            rates,
            base_currency: self.base_currency.clone(),
            date: self.date.clone(),
            currency: self.currency.clone(),
            request_id: request_id.to_string(),
        }
    }
}
