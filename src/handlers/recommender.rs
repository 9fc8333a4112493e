use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    errors::{ErrorResponse, ServiceError},
    handlers::common::{optional_json_body, ApiPath, ApiQuery, CountQuery},
    models::{Interaction, Product, Recommendation, SimilarProduct},
    AppState,
};

/// Build the recommender Router scoped under `/api/recommender`.
pub fn recommender_routes() -> Router<AppState> {
    Router::new()
        .route("/train", post(train_recommender))
        .route("/similar/{product_id}", get(similar_products))
        .route("/recommend/user/{user_id}", get(recommend_for_user))
        .route("/recommend/category/{category}", get(recommend_by_category))
        .route("/products", get(list_products))
        .route("/products/{product_id}", get(get_product))
}

/// Training input; when either table is missing the sample data is used
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RecommenderTrainRequest {
    pub interactions: Option<Vec<Interaction>>,
    pub products: Option<Vec<Product>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecommenderTrainResponse {
    pub success: bool,
    pub message: String,
    pub users: usize,
    pub rated_products: usize,
    pub catalog_size: usize,
    pub used_sample_data: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SimilarProductsResponse {
    pub success: bool,
    pub product_id: i64,
    pub similar_products: Vec<SimilarProduct>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRecommendationsResponse {
    pub success: bool,
    pub user_id: i64,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryRecommendationsResponse {
    pub success: bool,
    pub category: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub success: bool,
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub success: bool,
    pub product: Product,
}

/// Train the product recommender
#[utoipa::path(
    post,
    path = "/api/recommender/train",
    request_body(content = Option<RecommenderTrainRequest>, description = "Ratings and catalog; an empty body trains on sample data"),
    responses(
        (status = 200, description = "Model trained", body = RecommenderTrainResponse),
        (status = 400, description = "Invalid training data", body = ErrorResponse),
        (status = 409, description = "Training already in progress", body = ErrorResponse),
        (status = 500, description = "Training failed", body = ErrorResponse)
    ),
    tag = "Recommender"
)]
pub async fn train_recommender(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RecommenderTrainResponse>, ServiceError> {
    let request: RecommenderTrainRequest = optional_json_body(&body)?.unwrap_or_default();
    let summary = state
        .services
        .recommender
        .train(request.interactions, request.products)
        .await?;

    info!(
        users = summary.users,
        products = summary.products,
        "Recommender trained via API"
    );

    Ok(Json(RecommenderTrainResponse {
        success: true,
        message: "Recommender trained successfully".to_string(),
        users: summary.users,
        rated_products: summary.rated_products,
        catalog_size: summary.products,
        used_sample_data: summary.used_sample_data,
    }))
}

/// Products most similar to the given one
#[utoipa::path(
    get,
    path = "/api/recommender/similar/{product_id}",
    params(
        ("product_id" = i64, Path, description = "Product ID"),
        CountQuery
    ),
    responses(
        (status = 200, description = "Similar products", body = SimilarProductsResponse),
        (status = 400, description = "Invalid count", body = ErrorResponse),
        (status = 503, description = "Recommender not trained", body = ErrorResponse)
    ),
    tag = "Recommender"
)]
pub async fn similar_products(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<CountQuery>,
) -> Result<Json<SimilarProductsResponse>, ServiceError> {
    let similar_products = state
        .services
        .recommender
        .similar(product_id, params.count()?)
        .await?;

    Ok(Json(SimilarProductsResponse {
        success: true,
        product_id,
        similar_products,
    }))
}

/// Personalized recommendations for a user
#[utoipa::path(
    get,
    path = "/api/recommender/recommend/user/{user_id}",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        CountQuery
    ),
    responses(
        (status = 200, description = "Recommendations", body = UserRecommendationsResponse),
        (status = 400, description = "Invalid count", body = ErrorResponse),
        (status = 503, description = "Recommender not trained", body = ErrorResponse)
    ),
    tag = "Recommender"
)]
pub async fn recommend_for_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<CountQuery>,
) -> Result<Json<UserRecommendationsResponse>, ServiceError> {
    let recommendations = state
        .services
        .recommender
        .recommend_for_user(user_id, params.count()?)
        .await?;

    Ok(Json(UserRecommendationsResponse {
        success: true,
        user_id,
        recommendations,
    }))
}

/// Most efficient products in a category
#[utoipa::path(
    get,
    path = "/api/recommender/recommend/category/{category}",
    params(
        ("category" = String, Path, description = "Product category, matched exactly"),
        CountQuery
    ),
    responses(
        (status = 200, description = "Recommendations", body = CategoryRecommendationsResponse),
        (status = 400, description = "Invalid count", body = ErrorResponse),
        (status = 503, description = "Recommender not trained", body = ErrorResponse)
    ),
    tag = "Recommender"
)]
pub async fn recommend_by_category(
    State(state): State<AppState>,
    ApiPath(category): ApiPath<String>,
    ApiQuery(params): ApiQuery<CountQuery>,
) -> Result<Json<CategoryRecommendationsResponse>, ServiceError> {
    let recommendations = state
        .services
        .recommender
        .recommend_by_category(&category, params.count()?)
        .await?;

    Ok(Json(CategoryRecommendationsResponse {
        success: true,
        category,
        recommendations,
    }))
}

/// The trained product catalog
#[utoipa::path(
    get,
    path = "/api/recommender/products",
    responses(
        (status = 200, description = "Product catalog", body = ProductListResponse),
        (status = 503, description = "Recommender not trained", body = ErrorResponse)
    ),
    tag = "Recommender"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ProductListResponse>, ServiceError> {
    let products = state.services.recommender.list_products().await?;
    Ok(Json(ProductListResponse {
        success: true,
        products,
    }))
}

/// A single catalog product
#[utoipa::path(
    get,
    path = "/api/recommender/products/{product_id}",
    params(("product_id" = i64, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product found", body = ProductResponse),
        (status = 404, description = "Unknown product", body = ErrorResponse),
        (status = 503, description = "Recommender not trained", body = ErrorResponse)
    ),
    tag = "Recommender"
)]
pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
) -> Result<Json<ProductResponse>, ServiceError> {
    let product = state.services.recommender.get_product(product_id).await?;
    Ok(Json(ProductResponse {
        success: true,
        product,
    }))
}
