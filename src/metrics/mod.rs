/*!
 * # Metrics Module
 *
 * In-process metrics for the prediction services.
 *
 * ## Metrics Formats
 *
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge storing an `f64` as raw bits
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Count/sum histogram. The sum is kept in microunits to stay lock-free.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, value: f64) {
        let micros = (value.max(0.0) * 1_000_000.0).round() as u64;
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        use std::fmt::Write;

        let mut output = String::new();
        let write_err = |e: std::fmt::Error| MetricsError::ExportError(e.to_string());

        let mut counters: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        counters.sort();
        for (name, value) in counters {
            writeln!(output, "# TYPE {} counter", name).map_err(write_err)?;
            writeln!(output, "{} {}", name, value).map_err(write_err)?;
        }

        let mut gauges: Vec<_> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in gauges {
            writeln!(output, "# TYPE {} gauge", name).map_err(write_err)?;
            writeln!(output, "{} {}", name, value).map_err(write_err)?;
        }

        let mut histograms: Vec<_> = self
            .histograms
            .iter()
            .map(|e| (e.key().clone(), e.value().get_count(), e.value().get_sum()))
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, count, sum) in histograms {
            writeln!(output, "# TYPE {} summary", name).map_err(write_err)?;
            writeln!(output, "{}_count {}", name, count).map_err(write_err)?;
            writeln!(output, "{}_sum {}", name, sum).map_err(write_err)?;
        }

        Ok(output)
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<_, _> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), json!(e.value().get())))
            .collect();

        let gauges: serde_json::Map<_, _> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), json!(e.value().get())))
            .collect();

        let histograms: serde_json::Map<_, _> = self
            .histograms
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    json!({
                        "count": e.value().get_count(),
                        "sum": e.value().get_sum(),
                    }),
                )
            })
            .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_histogram(name: &str, value: f64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

/// Metrics describing the two prediction models
pub struct ModelMetrics {
    pub forecaster_trainings: Counter,
    pub forecasts_served: Counter,
    pub forecast_points_served: Counter,
    pub forecaster_mae: Gauge,
    pub forecaster_rmse: Gauge,
    pub recommender_trainings: Counter,
    pub recommendations_served: Counter,
    pub recommender_users: Gauge,
    pub recommender_products: Gauge,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            forecaster_trainings: METRICS.get_or_create_counter("forecaster_trainings_total"),
            forecasts_served: METRICS.get_or_create_counter("forecasts_served_total"),
            forecast_points_served: METRICS.get_or_create_counter("forecast_points_served_total"),
            forecaster_mae: METRICS.get_or_create_gauge("forecaster_mae"),
            forecaster_rmse: METRICS.get_or_create_gauge("forecaster_rmse"),
            recommender_trainings: METRICS.get_or_create_counter("recommender_trainings_total"),
            recommendations_served: METRICS.get_or_create_counter("recommendations_served_total"),
            recommender_users: METRICS.get_or_create_gauge("recommender_users"),
            recommender_products: METRICS.get_or_create_gauge("recommender_products"),
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// HTTP request metrics grouped by status class
pub struct EndpointMetrics {
    pub requests_total: Counter,
    pub latency: Histogram,
    pub status_2xx: Counter,
    pub status_4xx: Counter,
    pub status_5xx: Counter,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: METRICS.get_or_create_counter("http_requests_total"),
            latency: METRICS.get_or_create_histogram("http_request_duration_seconds"),
            status_2xx: METRICS.get_or_create_counter("http_status_2xx_total"),
            status_4xx: METRICS.get_or_create_counter("http_status_4xx_total"),
            status_5xx: METRICS.get_or_create_counter("http_status_5xx_total"),
        }
    }

    pub fn record_request(&self, duration: Duration, status_code: u16) {
        self.requests_total.inc();
        self.latency.observe(duration.as_secs_f64());

        match status_code {
            200..=299 => self.status_2xx.inc(),
            400..=499 => self.status_4xx.inc(),
            500..=599 => self.status_5xx.inc(),
            _ => {}
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// Global instances
lazy_static::lazy_static! {
    pub static ref MODEL_METRICS: ModelMetrics = ModelMetrics::new();
    pub static ref ENDPOINT_METRICS: EndpointMetrics = EndpointMetrics::new();
}

/// Middleware recording request counts and latency
pub async fn track_http_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    ENDPOINT_METRICS.record_request(start.elapsed(), response.status().as_u16());
    response
}

/// HTTP endpoint handler for Prometheus text metrics
pub async fn metrics_handler() -> Response {
    match METRICS.export_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to export metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics error"),
            )
                .into_response()
        }
    }
}

pub async fn metrics_json_handler() -> Json<serde_json::Value> {
    Json(METRICS.export_metrics_json())
}
