use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Renewable Energy API",
        version = "1.0.0",
        description = r#"
# Renewable Energy API

Energy-demand forecasting and renewable product recommendations.

## Forecast

- Train an hourly demand model on historical `{ds, y}` pairs, or on generated sample demand
- Forecast a horizon of hourly periods with prediction intervals and seasonal components
- Download the forecast and its components as PNG charts

## Recommender

- Train an item-based collaborative filter from user ratings and a product catalog
- Find similar products, personalized recommendations, and the most efficient products per category

## Model lifecycle

Prediction endpoints answer `503 Service Unavailable` until the relevant model has been trained
or restored from its snapshot. A second training request while one is running is rejected with
`409 Conflict`.

## Error Handling

Errors use a consistent body:

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Validation error: periods must be between 1 and 8760",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "Forecast", description = "Energy demand forecasting endpoints"),
        (name = "Recommender", description = "Product recommendation endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Forecast
        crate::handlers::forecast::train_forecaster,
        crate::handlers::forecast::predict,
        crate::handlers::forecast::get_metrics,
        crate::handlers::forecast::plot_forecast,
        crate::handlers::forecast::plot_components,

        // Recommender
        crate::handlers::recommender::train_recommender,
        crate::handlers::recommender::similar_products,
        crate::handlers::recommender::recommend_for_user,
        crate::handlers::recommender::recommend_by_category,
        crate::handlers::recommender::list_products,
        crate::handlers::recommender::get_product,

        // Health
        crate::health::health_check,
        crate::health::readiness_check,
    ),
    components(
        schemas(
            // Domain types
            crate::models::Observation,
            crate::models::ForecastPoint,
            crate::models::ForecastMetrics,
            crate::models::Product,
            crate::models::Interaction,
            crate::models::SimilarProduct,
            crate::models::Recommendation,

            // Forecast types
            crate::handlers::forecast::ForecastTrainRequest,
            crate::handlers::forecast::ForecastTrainResponse,
            crate::handlers::forecast::ForecastResponse,
            crate::handlers::forecast::ForecastMetricsResponse,

            // Recommender types
            crate::handlers::recommender::RecommenderTrainRequest,
            crate::handlers::recommender::RecommenderTrainResponse,
            crate::handlers::recommender::SimilarProductsResponse,
            crate::handlers::recommender::UserRecommendationsResponse,
            crate::handlers::recommender::CategoryRecommendationsResponse,
            crate::handlers::recommender::ProductListResponse,
            crate::handlers::recommender::ProductResponse,

            // Health types
            crate::health::HealthResponse,
            crate::health::ReadinessResponse,
            crate::services::ModelStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
