/*!
 * # Health Check Module
 *
 * Endpoints for monitoring the Renewable Energy API:
 *
 * - Basic health check (`/api/health`) - the process is up
 * - Readiness check (`/api/health/ready`) - both models are loaded and serving
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::{services::ModelStatus, AppState};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub models: Vec<ModelStatus>,
    pub timestamp: DateTime<Utc>,
}

/// Creates router with health check endpoints, nested under `/api/health`
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
}

/// Basic health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is running", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check endpoint called");
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Renewable Energy API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/health/ready",
    responses(
        (status = 200, description = "Both models are loaded", body = ReadinessResponse),
        (status = 503, description = "At least one model is not loaded", body = ReadinessResponse)
    ),
    tag = "Health"
)]
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let models = vec![
        state.services.forecast.status().await,
        state.services.recommender.status().await,
    ];
    let ready = models.iter().all(|m| m.loaded);

    let status_code = if ready {
        StatusCode::OK
    } else {
        let missing: Vec<&str> = models
            .iter()
            .filter(|m| !m.loaded)
            .map(|m| m.name.as_str())
            .collect();
        warn!(?missing, "Readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            ready,
            models,
            timestamp: Utc::now(),
        }),
    )
}
