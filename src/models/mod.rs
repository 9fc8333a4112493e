//! Domain types shared by the models, services and HTTP layer.

pub mod product;
pub mod time_series;

pub use product::{Interaction, Product, Recommendation, SimilarProduct};
pub use time_series::{parse_timestamp, ForecastMetrics, ForecastPoint, Observation};
