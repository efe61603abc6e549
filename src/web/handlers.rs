//! # Currency Handlers
//!
//! `GET /currencies/all`, `GET /currencies/single/{code}`,
//! `GET /currencies/filter/{list}`, and a `GET /health` probe.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::constants::REPLY_PREFIX;
use crate::models::QueryKind;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Build the edge router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/currencies/all", get(get_all_currencies))
        .route("/currencies/single/{code}", get(get_single_currency))
        .route("/currencies/filter/{list}", get(get_filtered_currencies))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Every rate the upstream knows: GET /currencies/all
async fn get_all_currencies(State(state): State<AppState>) -> Result<String, ApiError> {
    info!("handling /currencies/all");
    let reply = state.gateway.query(QueryKind::All, "").await?;
    Ok(frame_reply(&reply))
}

/// One code: GET /currencies/single/{code}
async fn get_single_currency(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<String, ApiError> {
    info!(code = %code, "handling /currencies/single");
    let reply = state.gateway.query(QueryKind::Single, &code).await?;
    Ok(frame_reply(&reply))
}

/// A comma-separated list: GET /currencies/filter/{list}
async fn get_filtered_currencies(
    State(state): State<AppState>,
    Path(list): Path<String>,
) -> Result<String, ApiError> {
    info!(list = %list, "handling /currencies/filter");
    let reply = state.gateway.query(QueryKind::Filter, &list).await?;
    Ok(frame_reply(&reply))
}

/// Liveness of the bus and storage backends: GET /health
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let bus_healthy = state.bus.health_check().await;
    let storage_healthy = state.storage.health_check().await;
    let status = if bus_healthy && storage_healthy {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "bus": bus_healthy,
        "storage": storage_healthy,
        "pending_requests": state.gateway.pending_len(),
    }))
}

fn frame_reply(reply: &str) -> String {
    format!("{REPLY_PREFIX}{reply}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EdgeConfig, PoolConfig};
    use crate::correlator::{PendingRequests, QueryGateway};
    use crate::executor::WorkerPool;
    use crate::messaging::BusProvider;
    use crate::storage::StorageProvider;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let bus = Arc::new(BusProvider::new_in_memory());
        let storage = Arc::new(StorageProvider::new_in_memory());
        let pool = WorkerPool::start(&PoolConfig::default());
        let pending = Arc::new(PendingRequests::new());
        let gateway = Arc::new(QueryGateway::new(
            Arc::clone(&bus),
            pool,
            pending,
            &EdgeConfig {
                request_timeout_sec: 1,
                ..Default::default()
            },
        ));
        AppState::new(gateway, bus, storage)
    }

    #[test]
    fn reply_framing_is_byte_exact() {
        let framed = frame_reply("{\"rates\":{}}");
        assert_eq!(
            framed,
            "По заданным параметрам успешно получен ответ : {\"rates\":{}}"
        );
    }

    #[tokio::test]
    async fn invalid_single_code_is_rejected_at_the_edge() {
        let state = test_state();
        let result = get_single_currency(State(state), Path("usd".to_string())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn health_reports_backends() {
        let state = test_state();
        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["bus"], true);
        assert_eq!(body["storage"], true);
    }

    #[tokio::test]
    async fn unanswered_query_times_out_as_error() {
        let state = test_state();
        let result = get_all_currencies(State(state)).await;
        // Nothing consumes the request topic in this test, so the edge
        // deadline fires.
        assert!(result.is_err());
    }
}
