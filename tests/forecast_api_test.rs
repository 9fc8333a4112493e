mod common;

use axum::http::{header, Method, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{hourly_series, response_bytes, response_json, TestApp};
use serde_json::json;

fn parse_ds(value: &serde_json::Value) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value.as_str().unwrap())
        .unwrap()
        .with_timezone(&Utc)
}

#[tokio::test]
async fn predict_before_training_is_unavailable() {
    let app = TestApp::new();

    let response = app.get("/api/forecast/predict").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("/api/forecast/train"));

    let response = app.get("/api/forecast/metrics").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn train_then_predict_returns_hourly_horizon() {
    let app = TestApp::new();
    let trained = app.train_forecaster(100).await;
    assert_eq!(trained["success"], true);
    assert_eq!(trained["points"], 100);
    assert!(trained["metrics"]["mae"].as_f64().unwrap() >= 0.0);
    assert!(trained["metrics"]["rmse"].as_f64().unwrap() >= trained["metrics"]["mae"].as_f64().unwrap());

    let response = app.get("/api/forecast/predict?periods=24").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["periods"], 24);

    let forecast = body["forecast"].as_array().unwrap();
    assert_eq!(forecast.len(), 24);

    let last_training = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(99);
    for (i, point) in forecast.iter().enumerate() {
        assert_eq!(parse_ds(&point["ds"]), last_training + Duration::hours(i as i64 + 1));
        let yhat = point["yhat"].as_f64().unwrap();
        assert!(point["yhat_lower"].as_f64().unwrap() <= yhat);
        assert!(yhat <= point["yhat_upper"].as_f64().unwrap());
        for key in ["trend", "season_daily", "season_weekly", "season_yearly"] {
            assert!(point[key].is_number(), "missing {}", key);
        }
    }
}

#[tokio::test]
async fn empty_body_trains_on_sample_data() {
    let app = TestApp::new();
    let response = app.post("/api/forecast/train", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["used_sample_data"], true);
    assert_eq!(body["points"], 14 * 24 + 1);

    let response = app.request_raw(Method::POST, "/api/forecast/train", "null").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn default_horizon_is_a_day() {
    let app = TestApp::new();
    app.train_forecaster(48).await;
    let body = response_json(app.get("/api/forecast/predict").await).await;
    assert_eq!(body["forecast"].as_array().unwrap().len(), 24);
}

#[tokio::test]
async fn invalid_training_data_is_rejected() {
    let app = TestApp::new();

    let too_short = json!({ "historical_data": hourly_series(5) });
    let response = app.post("/api/forecast/train", Some(too_short)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let empty = json!({ "historical_data": [] });
    let response = app.post("/api/forecast/train", Some(empty)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut series = hourly_series(20);
    series[3]["ds"] = series[2]["ds"].clone();
    let duplicate = json!({ "historical_data": series });
    let response = app.post("/api/forecast/train", Some(duplicate)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing_field = json!({ "historical_data": [{ "ds": "2024-01-01 00:00:00" }] });
    let response = app.post("/api/forecast/train", Some(missing_field)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bad_timestamp = json!({ "historical_data": [{ "ds": "yesterday", "y": 1.0 }] });
    let response = app.post("/api/forecast/train", Some(bad_timestamp)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.request_raw(Method::POST, "/api/forecast/train", "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // nothing was published by the failed attempts
    let response = app.get("/api/forecast/metrics").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn horizon_outside_bounds_is_rejected() {
    let app = TestApp::new();
    app.train_forecaster(48).await;

    for uri in [
        "/api/forecast/predict?periods=0",
        "/api/forecast/predict?periods=-3",
        "/api/forecast/predict?periods=8761",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = response_json(response).await;
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn unparseable_query_values_get_the_json_error_envelope() {
    let app = TestApp::new();
    app.train_forecaster(48).await;

    for uri in [
        "/api/forecast/predict?periods=abc",
        "/api/forecast/plot?periods=1.5",
        "/api/forecast/plot/components?periods=ten",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = response_json(response).await;
        assert_eq!(body["success"], false, "{}", uri);
        assert!(body["message"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn metrics_match_training_response() {
    let app = TestApp::new();
    let trained = app.train_forecaster(72).await;

    let body = response_json(app.get("/api/forecast/metrics").await).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["metrics"], trained["metrics"]);
}

#[tokio::test]
async fn plots_are_png_attachments() {
    let app = TestApp::new();
    app.train_forecaster(72).await;

    let response = app.get("/api/forecast/plot?periods=12&include_history=false").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("energy_forecast.png"));
    let png = response_bytes(response).await;
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

    let response = app.get("/api/forecast/plot/components?periods=12").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("forecast_components.png"));
    let png = response_bytes(response).await;
    assert_eq!(&png[1..4], b"PNG");
}

#[tokio::test]
async fn snapshot_is_restored_on_startup() {
    let app = TestApp::new();
    app.train_forecaster(60).await;
    let before = response_json(app.get("/api/forecast/predict?periods=6").await).await;

    let restored = TestApp::restored(app.model_dir).await;
    let after = response_json(restored.get("/api/forecast/predict?periods=6").await).await;

    let before = before["forecast"].as_array().unwrap();
    let after = after["forecast"].as_array().unwrap();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after) {
        assert_eq!(parse_ds(&a["ds"]), parse_ds(&b["ds"]));
        let diff = a["yhat"].as_f64().unwrap() - b["yhat"].as_f64().unwrap();
        assert!(diff.abs() < 1e-6);
    }
}

#[tokio::test]
async fn unsupported_snapshot_leaves_service_uninitialized() {
    let app = TestApp::new();
    let snapshot = json!({
        "schema_version": 99,
        "kind": "forecaster",
        "saved_at": "2024-01-01T00:00:00Z",
        "payload": {}
    });
    std::fs::write(
        app.model_dir.path().join("forecaster_model.json"),
        snapshot.to_string(),
    )
    .unwrap();

    let restored = TestApp::restored(app.model_dir).await;
    let response = restored.get("/api/forecast/predict").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
