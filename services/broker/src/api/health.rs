//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    pub service: String,

    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Unclaimed share of the cluster pool, e.g. "90.00".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_capacity: Option<String>,

    /// Operations dispatched and not yet reported to a poller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_operations: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            service: "yarnbroker".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
            available_capacity: None,
            pending_operations: None,
            message: None,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

/// Liveness of the process; does not look at the quota pool.
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse::ok())
}

/// Ready once the quota pool holds a readable configuration.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.orchestrator();
    let mut response = HealthResponse::ok();
    response.pending_operations = Some(orchestrator.registry().len());

    match orchestrator.pool().available_capacity() {
        Ok(available) => {
            response.available_capacity = Some(available.to_string());
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            response.status = "degraded".to_string();
            response.message = Some(e.to_string());
            (StatusCode::SERVICE_UNAVAILABLE, Json(response))
        }
    }
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
