/*!
 * # Machine Learning Module
 *
 * Pure model code for the two prediction services. Nothing here touches
 * HTTP, storage or async runtimes; the services in `crate::services` own
 * the trained values and decide when to fit them.
 *
 * - `forecasting`: MSTL decomposition with an AutoETS trend (augurs)
 * - `recommendations`: item-item cosine collaborative filtering
 * - `sample_data`: deterministic synthetic training sets
 * - `plotting`: PNG rendering of forecasts and components
 */

use thiserror::Error;

use crate::errors::ServiceError;

pub mod forecasting;
pub mod plotting;
pub mod recommendations;
pub mod sample_data;

pub use forecasting::{ForecasterSettings, ForecasterState, TrainedForecaster};
pub use recommendations::TrainedRecommender;

/// Failures raised while validating input or fitting a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("duplicate timestamp {0}")]
    DuplicateTimestamp(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("plot rendering failed: {0}")]
    Render(String),
}

impl From<ModelError> for ServiceError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InsufficientData { .. }
            | ModelError::DuplicateTimestamp(_)
            | ModelError::InvalidInput(_) => ServiceError::ValidationError(err.to_string()),
            ModelError::Numerical(msg) => ServiceError::TrainingError(msg),
            ModelError::Render(msg) => ServiceError::PlotError(msg),
        }
    }
}
