use axum::{
    body::Bytes,
    extract::State,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    errors::{ErrorResponse, ServiceError},
    handlers::common::{
        non_negative, optional_json_body, png_attachment, truthy_flag, ApiQuery,
    },
    models::{ForecastMetrics, ForecastPoint, Observation},
    services::PlotKind,
    AppState,
};

/// Build the forecast Router scoped under `/api/forecast`.
pub fn forecast_routes() -> Router<AppState> {
    Router::new()
        .route("/train", post(train_forecaster))
        .route("/predict", get(predict))
        .route("/metrics", get(get_metrics))
        .route("/plot", get(plot_forecast))
        .route("/plot/components", get(plot_components))
}

/// Training input; omit `historical_data` to train on sample demand
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ForecastTrainRequest {
    pub historical_data: Option<Vec<Observation>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastTrainResponse {
    pub success: bool,
    pub message: String,
    pub metrics: ForecastMetrics,
    /// Number of observations the model was fitted on
    pub points: usize,
    pub used_sample_data: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub success: bool,
    pub periods: usize,
    pub forecast: Vec<ForecastPoint>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastMetricsResponse {
    pub success: bool,
    pub metrics: ForecastMetrics,
}

/// Forecast horizon
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PeriodsQuery {
    /// Number of hourly periods to forecast (default: 24)
    #[param(minimum = 1, maximum = 8760)]
    pub periods: Option<i64>,
}

/// Forecast plot options
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PlotQuery {
    /// Number of hourly periods to forecast (default: 24)
    #[param(minimum = 1, maximum = 8760)]
    pub periods: Option<i64>,
    /// Draw the recent training history; only `true` enables it (default: true)
    pub include_history: Option<String>,
}

/// Train the demand forecaster
#[utoipa::path(
    post,
    path = "/api/forecast/train",
    request_body(content = Option<ForecastTrainRequest>, description = "Historical demand; an empty body trains on sample data"),
    responses(
        (status = 200, description = "Model trained", body = ForecastTrainResponse),
        (status = 400, description = "Invalid training data", body = ErrorResponse),
        (status = 409, description = "Training already in progress", body = ErrorResponse),
        (status = 500, description = "Training failed", body = ErrorResponse)
    ),
    tag = "Forecast"
)]
pub async fn train_forecaster(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ForecastTrainResponse>, ServiceError> {
    let request: ForecastTrainRequest = optional_json_body(&body)?.unwrap_or_default();
    let summary = state.services.forecast.train(request.historical_data).await?;

    info!(
        points = summary.points,
        mae = summary.metrics.mae,
        rmse = summary.metrics.rmse,
        "Forecaster trained via API"
    );

    Ok(Json(ForecastTrainResponse {
        success: true,
        message: "Model trained successfully".to_string(),
        metrics: summary.metrics,
        points: summary.points,
        used_sample_data: summary.used_sample_data,
    }))
}

/// Forecast hourly demand
#[utoipa::path(
    get,
    path = "/api/forecast/predict",
    params(PeriodsQuery),
    responses(
        (status = 200, description = "Forecast generated", body = ForecastResponse),
        (status = 400, description = "Invalid horizon", body = ErrorResponse),
        (status = 503, description = "Forecaster not trained", body = ErrorResponse)
    ),
    tag = "Forecast"
)]
pub async fn predict(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PeriodsQuery>,
) -> Result<Json<ForecastResponse>, ServiceError> {
    let periods = non_negative(params.periods, "periods")?;
    let forecast = state.services.forecast.forecast(periods).await?;

    Ok(Json(ForecastResponse {
        success: true,
        periods: forecast.len(),
        forecast,
    }))
}

/// Fit metrics from the last training run
#[utoipa::path(
    get,
    path = "/api/forecast/metrics",
    responses(
        (status = 200, description = "Metrics retrieved", body = ForecastMetricsResponse),
        (status = 503, description = "Forecaster not trained", body = ErrorResponse)
    ),
    tag = "Forecast"
)]
pub async fn get_metrics(
    State(state): State<AppState>,
) -> Result<Json<ForecastMetricsResponse>, ServiceError> {
    let metrics = state.services.forecast.metrics().await?;
    Ok(Json(ForecastMetricsResponse {
        success: true,
        metrics,
    }))
}

/// Forecast chart as PNG
#[utoipa::path(
    get,
    path = "/api/forecast/plot",
    params(PlotQuery),
    responses(
        (status = 200, description = "PNG image", content_type = "image/png", body = Vec<u8>),
        (status = 400, description = "Invalid horizon", body = ErrorResponse),
        (status = 503, description = "Forecaster not trained", body = ErrorResponse)
    ),
    tag = "Forecast"
)]
pub async fn plot_forecast(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PlotQuery>,
) -> Result<Response, ServiceError> {
    let periods = non_negative(params.periods, "periods")?;
    let include_history = truthy_flag(params.include_history.as_deref(), true);
    let png = state
        .services
        .forecast
        .plot(periods, PlotKind::Forecast { include_history })
        .await?;
    Ok(png_attachment(png, "energy_forecast.png"))
}

/// Trend and seasonal components as PNG
#[utoipa::path(
    get,
    path = "/api/forecast/plot/components",
    params(PeriodsQuery),
    responses(
        (status = 200, description = "PNG image", content_type = "image/png", body = Vec<u8>),
        (status = 400, description = "Invalid horizon", body = ErrorResponse),
        (status = 503, description = "Forecaster not trained", body = ErrorResponse)
    ),
    tag = "Forecast"
)]
pub async fn plot_components(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PeriodsQuery>,
) -> Result<Response, ServiceError> {
    let periods = non_negative(params.periods, "periods")?;
    let png = state
        .services
        .forecast
        .plot(periods, PlotKind::Components)
        .await?;
    Ok(png_attachment(png, "forecast_components.png"))
}
