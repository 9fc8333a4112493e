use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// A renewable-energy product in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Validate)]
#[schema(example = json!({
    "id": 1,
    "name": "Solar Panel 300W",
    "category": "solar",
    "efficiency": 0.22,
    "price": 250.0
}))]
pub struct Product {
    pub id: i64,
    #[validate(length(min = 1))]
    pub name: String,
    pub category: String,
    /// Conversion efficiency in [0, 1]
    #[validate(range(min = 0.0, max = 1.0))]
    pub efficiency: f64,
    #[validate(range(min = 0.0))]
    pub price: f64,
}

impl Product {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        category: impl Into<String>,
        efficiency: f64,
        price: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category: category.into(),
            efficiency,
            price,
        }
    }
}

/// A user's rating of a product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Interaction {
    pub user_id: i64,
    pub product_id: i64,
    /// Typically 1 to 5; 0 is a valid rating
    pub rating: f64,
}

impl Interaction {
    pub fn new(user_id: i64, product_id: i64, rating: f64) -> Self {
        Self {
            user_id,
            product_id,
            rating,
        }
    }
}

/// A product together with its cosine similarity to the queried product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SimilarProduct {
    #[serde(flatten)]
    pub product: Product,
    pub similarity_score: f64,
}

/// A recommended product; personalized results carry a predicted rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Recommendation {
    #[serde(flatten)]
    pub product: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_rating: Option<f64>,
}

impl Recommendation {
    pub fn plain(product: Product) -> Self {
        Self {
            product,
            predicted_rating: None,
        }
    }

    pub fn predicted(product: Product, rating: f64) -> Self {
        Self {
            product,
            predicted_rating: Some(rating),
        }
    }
}
