use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, Instrument, Span};
use utoipa::ToSchema;

use crate::{
    config::RecommenderConfig,
    errors::ServiceError,
    metrics::MODEL_METRICS,
    ml::{
        sample_data::{sample_interactions, sample_products},
        TrainedRecommender,
    },
    models::{Interaction, Product, Recommendation, SimilarProduct},
    persistence::{PersistenceError, SnapshotStore},
    services::registry::{ModelRegistry, ModelStatus},
    tracing::with_timing,
};

pub const SNAPSHOT_FILE: &str = "recommender_model.json";
const SNAPSHOT_KIND: &str = "recommender";

/// Summary returned by a successful training run
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecommenderTrainingSummary {
    pub users: usize,
    pub products: usize,
    pub rated_products: usize,
    pub used_sample_data: bool,
}

/// Owns the product recommender and its snapshot on disk
pub struct RecommendationService {
    registry: Arc<ModelRegistry<TrainedRecommender>>,
    store: SnapshotStore,
    config: RecommenderConfig,
}

impl RecommendationService {
    pub fn new(model_dir: impl AsRef<Path>, config: RecommenderConfig) -> Self {
        Self {
            registry: Arc::new(ModelRegistry::new(
                "recommender",
                "POST /api/recommender/train",
            )),
            store: SnapshotStore::new(model_dir, SNAPSHOT_FILE, SNAPSHOT_KIND),
            config,
        }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Loads the persisted snapshot, if one exists
    #[instrument(skip(self))]
    pub async fn load_from_disk(&self) -> Result<bool, ServiceError> {
        let slot = self.registry.try_begin_training()?;
        let store = self.store.clone();
        let loaded =
            tokio::task::spawn_blocking(move || store.load::<TrainedRecommender>()).await?;

        match loaded {
            Ok(snapshot) => {
                let model = snapshot.payload;
                info!(
                    saved_at = %snapshot.saved_at,
                    users = model.user_count(),
                    products = model.products().len(),
                    "Recommender snapshot loaded"
                );
                Self::record_metrics(&model);
                self.registry.publish(&slot, model).await;
                Ok(true)
            }
            Err(PersistenceError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Builds a new model. When either table is missing the built-in sample
    /// catalog and interactions are used for both.
    ///
    /// Like forecaster training, the job owns the training slot until the
    /// saved model is published.
    #[instrument(skip_all)]
    pub async fn train(
        &self,
        interactions: Option<Vec<Interaction>>,
        products: Option<Vec<Product>>,
    ) -> Result<RecommenderTrainingSummary, ServiceError> {
        let slot = self.registry.try_begin_training()?;

        let (interactions, products, used_sample_data) = match (interactions, products) {
            (Some(interactions), Some(products)) => (interactions, products, false),
            _ => {
                info!("Interactions or products missing; training on sample data");
                (sample_interactions(), sample_products(), true)
            }
        };
        let store = self.store.clone();
        let registry = Arc::clone(&self.registry);

        let job = tokio::spawn(
            async move {
                let model = with_timing("recommender_training", || async move {
                    tokio::task::spawn_blocking(move || -> Result<TrainedRecommender, ServiceError> {
                        let model = TrainedRecommender::fit(&interactions, products)?;
                        store.save(&model)?;
                        Ok(model)
                    })
                    .await?
                })
                .await?;

                let summary = RecommenderTrainingSummary {
                    users: model.user_count(),
                    products: model.products().len(),
                    rated_products: model.rated_product_count(),
                    used_sample_data,
                };
                Self::record_metrics(&model);
                registry.publish(&slot, model).await;
                MODEL_METRICS.recommender_trainings.inc();
                Ok::<_, ServiceError>(summary)
            }
            .instrument(Span::current()),
        );
        job.await?
    }

    /// Checks a requested result count against the configured bounds
    pub fn resolve_count(&self, count: Option<usize>) -> Result<usize, ServiceError> {
        let count = count.unwrap_or(self.config.default_count);
        if count > self.config.max_count {
            return Err(ServiceError::ValidationError(format!(
                "count must be between 0 and {}",
                self.config.max_count
            )));
        }
        Ok(count)
    }

    pub async fn similar(
        &self,
        product_id: i64,
        count: Option<usize>,
    ) -> Result<Vec<SimilarProduct>, ServiceError> {
        let count = self.resolve_count(count)?;
        let model = self.registry.require().await?;
        let similar = model.similar_products(product_id, count);
        MODEL_METRICS.recommendations_served.inc();
        Ok(similar)
    }

    pub async fn recommend_for_user(
        &self,
        user_id: i64,
        count: Option<usize>,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        let count = self.resolve_count(count)?;
        let model = self.registry.require().await?;
        let recommendations = model.recommend_for_user(user_id, count);
        MODEL_METRICS.recommendations_served.inc();
        Ok(recommendations)
    }

    pub async fn recommend_by_category(
        &self,
        category: &str,
        count: Option<usize>,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        let count = self.resolve_count(count)?;
        let model = self.registry.require().await?;
        let recommendations = model.recommend_by_category(category, count);
        MODEL_METRICS.recommendations_served.inc();
        Ok(recommendations)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ServiceError> {
        Ok(self.registry.require().await?.products().to_vec())
    }

    pub async fn get_product(&self, product_id: i64) -> Result<Product, ServiceError> {
        self.registry
            .require()
            .await?
            .product(product_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn current(&self) -> Option<Arc<TrainedRecommender>> {
        self.registry.current().await
    }

    pub async fn status(&self) -> ModelStatus {
        self.registry.status().await
    }

    fn record_metrics(model: &TrainedRecommender) {
        MODEL_METRICS.recommender_users.set(model.user_count() as f64);
        MODEL_METRICS
            .recommender_products
            .set(model.products().len() as f64);
    }
}
