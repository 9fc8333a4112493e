pub mod common;
pub mod forecast;
pub mod recommender;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    services::{ForecastService, RecommendationService},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates the models used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub forecast: Arc<ForecastService>,
    pub recommender: Arc<RecommendationService>,
}

impl AppServices {
    /// Build both services over the configured model directory. Nothing is loaded yet.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            forecast: Arc::new(ForecastService::new(
                &config.model_dir,
                config.forecast.clone(),
            )),
            recommender: Arc::new(RecommendationService::new(
                &config.model_dir,
                config.recommender.clone(),
            )),
        }
    }

    /// Restores persisted snapshots and, when enabled, trains any model that is
    /// still missing on sample data.
    ///
    /// A snapshot that fails to load leaves that service uninitialized.
    pub async fn bootstrap(&self, train_missing: bool) {
        match self.forecast.load_from_disk().await {
            Ok(true) => {}
            Ok(false) => info!("No forecaster snapshot found"),
            Err(e) => error!(error = %e, "Failed to load forecaster snapshot"),
        }
        match self.recommender.load_from_disk().await {
            Ok(true) => {}
            Ok(false) => info!("No recommender snapshot found"),
            Err(e) => error!(error = %e, "Failed to load recommender snapshot"),
        }

        if !train_missing {
            return;
        }

        if !self.forecast.status().await.loaded {
            warn!("bootstrap_sample_models enabled; training forecaster on sample data");
            if let Err(e) = self.forecast.train(None).await {
                error!(error = %e, "Sample forecaster training failed");
            }
        }
        if !self.recommender.status().await.loaded {
            warn!("bootstrap_sample_models enabled; training recommender on sample data");
            if let Err(e) = self.recommender.train(None, None).await {
                error!(error = %e, "Sample recommender training failed");
            }
        }
    }
}
