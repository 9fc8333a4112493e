use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Holds the current snapshot of one trained model.
///
/// Readers clone the `Arc` and never observe a half-built model. At most one
/// training job runs at a time; a second one is rejected rather than queued.
/// The slot is an owned guard so a job can carry it into a spawned task and
/// hold it until the model is published.
#[derive(Debug)]
pub struct ModelRegistry<T> {
    name: &'static str,
    train_hint: &'static str,
    current: RwLock<Option<Published<T>>>,
    training: Arc<Mutex<()>>,
}

#[derive(Debug)]
struct Published<T> {
    model: Arc<T>,
    published_at: DateTime<Utc>,
}

/// Proof that the caller holds the training slot
#[derive(Debug)]
pub struct TrainingSlot {
    _guard: OwnedMutexGuard<()>,
}

/// Point-in-time view of a registry, used by readiness checks
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelStatus {
    pub name: String,
    pub loaded: bool,
    pub training: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl<T> ModelRegistry<T> {
    pub fn new(name: &'static str, train_hint: &'static str) -> Self {
        Self {
            name,
            train_hint,
            current: RwLock::new(None),
            training: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn current(&self) -> Option<Arc<T>> {
        self.current.read().await.as_ref().map(|p| Arc::clone(&p.model))
    }

    /// Returns the current model or a `NotInitialized` error
    pub async fn require(&self) -> Result<Arc<T>, ServiceError> {
        self.current().await.ok_or_else(|| {
            ServiceError::NotInitialized(format!(
                "{} has not been trained; {} first",
                self.name, self.train_hint
            ))
        })
    }

    /// Claims the training slot without waiting
    pub fn try_begin_training(&self) -> Result<TrainingSlot, ServiceError> {
        Arc::clone(&self.training)
            .try_lock_owned()
            .map(|guard| TrainingSlot { _guard: guard })
            .map_err(|_| {
                ServiceError::Conflict(format!("{} training already in progress", self.name))
            })
    }

    /// Swaps in a new snapshot. Requires the training slot.
    pub async fn publish(&self, _slot: &TrainingSlot, model: T) -> Arc<T> {
        let model = Arc::new(model);
        *self.current.write().await = Some(Published {
            model: Arc::clone(&model),
            published_at: Utc::now(),
        });
        tracing::info!(model = self.name, "Model snapshot published");
        model
    }

    pub async fn is_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn status(&self) -> ModelStatus {
        let published_at = self.current.read().await.as_ref().map(|p| p.published_at);
        ModelStatus {
            name: self.name.to_string(),
            loaded: published_at.is_some(),
            training: self.training.try_lock().is_err(),
            published_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn empty_registry_reports_not_initialized() {
        let registry: ModelRegistry<u32> = ModelRegistry::new("forecaster", "train it");
        assert!(registry.current().await.is_none());
        assert_matches!(
            registry.require().await,
            Err(ServiceError::NotInitialized(msg)) if msg.contains("forecaster")
        );
        assert!(!registry.status().await.loaded);
    }

    #[tokio::test]
    async fn publish_replaces_snapshot_for_new_readers_only() {
        let registry = ModelRegistry::new("recommender", "train it");
        {
            let slot = registry.try_begin_training().unwrap();
            registry.publish(&slot, 1u32).await;
        }
        let before = registry.require().await.unwrap();

        let slot = registry.try_begin_training().unwrap();
        registry.publish(&slot, 2u32).await;

        assert_eq!(*before, 1);
        assert_eq!(*registry.require().await.unwrap(), 2);
        assert!(registry.status().await.loaded);
    }

    #[tokio::test]
    async fn concurrent_training_is_rejected() {
        let registry: ModelRegistry<u32> = ModelRegistry::new("forecaster", "train it");
        let slot = registry.try_begin_training().unwrap();
        assert!(registry.status().await.training);
        assert_matches!(
            registry.try_begin_training(),
            Err(ServiceError::Conflict(_))
        );
        drop(slot);
        assert!(registry.try_begin_training().is_ok());
    }

    #[tokio::test]
    async fn slot_moved_into_a_task_is_held_until_the_task_ends() {
        let registry = Arc::new(ModelRegistry::new("forecaster", "train it"));
        let slot = registry.try_begin_training().unwrap();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let job = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move {
                let _ = released.await;
                registry.publish(&slot, 7u32).await;
            }
        });

        assert_matches!(registry.try_begin_training(), Err(ServiceError::Conflict(_)));
        release.send(()).unwrap();
        job.await.unwrap();

        assert_eq!(*registry.require().await.unwrap(), 7);
        assert!(!registry.status().await.training);
    }
}
