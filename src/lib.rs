//! Renewable Energy API Library
//!
//! Hourly energy-demand forecasting and renewable product recommendations
//! served over HTTP.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod ml;
pub mod models;
pub mod openapi;
pub mod persistence;
pub mod services;
pub mod tracing;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the services without loading any model
    pub fn new(config: config::AppConfig) -> Self {
        let services = handlers::AppServices::new(&config);
        Self { config, services }
    }

    /// Restores snapshots and, if configured, trains missing models on sample data
    pub async fn bootstrap(&self) {
        if self.config.bootstrap_sample_models {
            tracing::info!("bootstrap_sample_models is enabled");
        }
        self.services
            .bootstrap(self.config.bootstrap_sample_models)
            .await;
    }
}

/// `/api` routes for both models and the health checks
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/forecast", handlers::forecast::forecast_routes())
        .nest("/recommender", handlers::recommender::recommender_routes())
        .nest("/health", health::health_routes())
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins = cfg.cors_origins();
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    tracing::info!(origins = ?origins, "CORS restricted to configured origins");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Assembles the full HTTP application
pub fn app(state: AppState) -> Router {
    let cfg = state.config.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "renewable-energy-api up" }))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(metrics::track_http_metrics))
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(cfg.max_body_size))
        .layer(RequestBodyLimitLayer::new(cfg.max_body_size))
        .layer(cors_layer(&cfg))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
