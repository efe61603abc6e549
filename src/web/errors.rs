//! HTTP error mapping for the edge surface.
//!
//! Status codes are the caller-visible half of the error taxonomy:
//! invalid input 400, pool/bus rejection 503, deadline 504, relayed
//! upstream failure 502, anything else 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::RelayError;

/// Edge-facing error wrapper.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct ApiError {
    #[from]
    source: RelayError,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.source {
            RelayError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            RelayError::Overloaded { .. } => (StatusCode::SERVICE_UNAVAILABLE, "OVERLOADED"),
            RelayError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            RelayError::Upstream { .. } | RelayError::UpstreamUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = json!({
            "error": {
                "code": code,
                "message": self.source.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: RelayError) -> StatusCode {
        ApiError::from(err).status_and_code().0
    }

    #[test]
    fn taxonomy_maps_to_distinct_status_codes() {
        assert_eq!(
            status_of(RelayError::invalid_request("bad code")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RelayError::overloaded("queue full")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(RelayError::timeout(10)), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_of(RelayError::upstream("rates api down")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(RelayError::internal("invariant broken")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(RelayError::fenced("epoch 9")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
