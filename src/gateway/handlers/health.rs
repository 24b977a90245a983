//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};

/// Health check response data
#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
    /// Storage backend in use
    #[schema(example = "postgres")]
    pub backend: String,
    /// Build commit
    pub version: String,
}

/// Health check endpoint
///
/// Pings the balance and audit stores. Failures are logged, not exposed.
///
/// - Healthy: 200 OK + {code: 0, data: {...}}
/// - Unhealthy: 503 Service Unavailable + {code: 5001, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let mut healthy = true;

    if let Err(e) = state.ledger().health_check().await {
        tracing::error!(error = %e, "[HEALTH] Account ledger ping failed");
        healthy = false;
    }
    if let Err(e) = state.audit().health_check().await {
        tracing::error!(error = %e, "[HEALTH] Audit log ping failed");
        healthy = false;
    }

    if healthy {
        (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                backend: state.backend.to_string(),
                version: env!("GIT_HASH").to_string(),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        )
    }
}
