#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use renewable_energy_api::{app, config::AppConfig, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

/// Helper harness for spinning up the application over a throwaway model directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub model_dir: TempDir,
}

impl TestApp {
    /// Construct a new application with no trained models.
    pub fn new() -> Self {
        let model_dir = TempDir::new().expect("failed to create model dir");
        Self::with_model_dir(model_dir)
    }

    /// Construct an application over an existing model directory, restoring any snapshots.
    pub async fn restored(model_dir: TempDir) -> Self {
        let app = Self::with_model_dir(model_dir);
        app.state.bootstrap().await;
        app
    }

    fn with_model_dir(model_dir: TempDir) -> Self {
        let mut cfg = AppConfig::default();
        cfg.environment = "test".to_string();
        cfg.model_dir = model_dir.path().to_path_buf();
        // keep fitting fast in tests
        cfg.forecast.sample_days = 14;
        cfg.forecast.plot_width = 400;
        cfg.forecast.plot_height = 300;

        let state = AppState::new(cfg);
        let router = app(state.clone());
        Self {
            router,
            state,
            model_dir,
        }
    }

    /// Issue a request against the router, optionally with a JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    /// Issue a request with a raw body.
    pub async fn request_raw(&self, method: Method, uri: &str, body: &'static str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Option<Value>) -> Response {
        self.request(Method::POST, uri, body).await
    }

    /// Train the forecaster on `points` synthetic hourly observations.
    pub async fn train_forecaster(&self, points: usize) -> Value {
        let response = self
            .post(
                "/api/forecast/train",
                Some(json!({ "historical_data": hourly_series(points) })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        response_json(response).await
    }

    /// Train the recommender on the built-in sample data.
    pub async fn train_recommender(&self) -> Value {
        let response = self.post("/api/recommender/train", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        response_json(response).await
    }
}

/// Hourly demand with a daily cycle, slow growth and a little jitter,
/// starting 2024-03-01 00:00 UTC.
pub fn hourly_series(points: usize) -> Vec<Value> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    (0..points)
        .map(|i| {
            let ds = start + Duration::hours(i as i64);
            let daily = 30.0 * ((i % 24) as f64 * std::f64::consts::PI / 12.0).sin();
            let jitter = ((i * 37) % 11) as f64 * 0.5;
            let y = 100.0 + 0.2 * i as f64 + daily + jitter;
            json!({ "ds": ds.format("%Y-%m-%d %H:%M:%S").to_string(), "y": y })
        })
        .collect()
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes()
        .to_vec()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = response_bytes(response).await;
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}
