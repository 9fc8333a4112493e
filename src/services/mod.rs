// Model lifecycle shared by both services
pub mod registry;

// Prediction services
pub mod forecasting;
pub mod recommendations;

pub use forecasting::{ForecastService, ForecastTrainingSummary, PlotKind};
pub use recommendations::{RecommendationService, RecommenderTrainingSummary};
pub use registry::{ModelRegistry, ModelStatus, TrainingSlot};
