use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn, Instrument, Span};
use utoipa::ToSchema;

use crate::{
    config::ForecastConfig,
    errors::ServiceError,
    metrics::MODEL_METRICS,
    ml::{
        plotting::{self, PlotSize},
        sample_data::sample_demand_series,
        ForecasterSettings, TrainedForecaster,
    },
    models::{ForecastMetrics, ForecastPoint, Observation},
    persistence::{self, PersistenceError, SnapshotStore},
    services::registry::{ModelRegistry, ModelStatus},
    tracing::with_timing,
};

pub const SNAPSHOT_FILE: &str = "forecaster_model.json";
const SNAPSHOT_KIND: &str = "forecaster";

/// Which chart to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    Forecast { include_history: bool },
    Components,
}

/// Summary returned by a successful training run
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ForecastTrainingSummary {
    pub metrics: ForecastMetrics,
    pub points: usize,
    pub used_sample_data: bool,
}

/// Owns the energy-demand forecaster and its snapshot on disk
pub struct ForecastService {
    registry: Arc<ModelRegistry<TrainedForecaster>>,
    store: SnapshotStore,
    config: ForecastConfig,
}

impl ForecastService {
    pub fn new(model_dir: impl AsRef<Path>, config: ForecastConfig) -> Self {
        Self {
            registry: Arc::new(ModelRegistry::new("forecaster", "POST /api/forecast/train")),
            store: SnapshotStore::new(model_dir, SNAPSHOT_FILE, SNAPSHOT_KIND),
            config,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Loads the persisted snapshot, if one exists.
    ///
    /// Returns `Ok(false)` when there is nothing to load.
    #[instrument(skip(self))]
    pub async fn load_from_disk(&self) -> Result<bool, ServiceError> {
        let slot = self.registry.try_begin_training()?;
        let store = self.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load::<TrainedForecaster>()).await?;

        match loaded {
            Ok(snapshot) => {
                let model = snapshot.payload;
                info!(
                    saved_at = %snapshot.saved_at,
                    last_timestamp = %model.last_timestamp(),
                    "Forecaster snapshot loaded"
                );
                Self::record_metrics(model.metrics());
                self.registry.publish(&slot, model).await;
                Ok(true)
            }
            Err(PersistenceError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Fits a new model on `series`, or on synthetic demand when none is given.
    ///
    /// The snapshot is persisted before it becomes visible to readers. Fitting,
    /// saving and publishing run in a spawned task that owns the training slot,
    /// so a caller that goes away cannot leave a saved model unpublished or let
    /// a second job start early.
    #[instrument(skip(self, series), fields(points = series.as_ref().map(Vec::len)))]
    pub async fn train(
        &self,
        series: Option<Vec<Observation>>,
    ) -> Result<ForecastTrainingSummary, ServiceError> {
        let slot = self.registry.try_begin_training()?;

        let used_sample_data = series.is_none();
        let series = series.unwrap_or_else(|| {
            info!(
                days = self.config.sample_days,
                "No historical data supplied; training on sample demand"
            );
            sample_demand_series(Utc::now(), self.config.sample_days, self.config.seed)
        });
        let points = series.len();
        let settings = ForecasterSettings::from(&self.config);
        let store = self.store.clone();
        let registry = Arc::clone(&self.registry);

        let job = tokio::spawn(
            async move {
                let model = with_timing("forecaster_training", || async move {
                    tokio::task::spawn_blocking(move || -> Result<TrainedForecaster, ServiceError> {
                        let model = TrainedForecaster::fit(series, settings)?;
                        store.save(&model)?;
                        Ok(model)
                    })
                    .await?
                })
                .await?;

                let metrics = model.metrics();
                registry.publish(&slot, model).await;
                MODEL_METRICS.forecaster_trainings.inc();
                Self::record_metrics(metrics);
                Ok::<_, ServiceError>(metrics)
            }
            .instrument(Span::current()),
        );
        let metrics = job.await??;

        Ok(ForecastTrainingSummary {
            metrics,
            points,
            used_sample_data,
        })
    }

    /// Checks a requested horizon against the configured bounds
    pub fn resolve_periods(&self, periods: Option<usize>) -> Result<usize, ServiceError> {
        let periods = periods.unwrap_or(self.config.default_periods);
        if periods == 0 || periods > self.config.max_periods {
            return Err(ServiceError::ValidationError(format!(
                "periods must be between 1 and {}",
                self.config.max_periods
            )));
        }
        Ok(periods)
    }

    #[instrument(skip(self))]
    pub async fn forecast(&self, periods: Option<usize>) -> Result<Vec<ForecastPoint>, ServiceError> {
        let periods = self.resolve_periods(periods)?;
        let model = self.registry.require().await?;
        let forecast = model.forecast(periods)?;

        MODEL_METRICS.forecasts_served.inc();
        MODEL_METRICS
            .forecast_points_served
            .inc_by(forecast.len() as u64);
        Ok(forecast)
    }

    pub async fn metrics(&self) -> Result<ForecastMetrics, ServiceError> {
        Ok(self.registry.require().await?.metrics())
    }

    /// Renders a chart as PNG bytes
    #[instrument(skip(self))]
    pub async fn plot(&self, periods: Option<usize>, kind: PlotKind) -> Result<Vec<u8>, ServiceError> {
        let periods = self.resolve_periods(periods)?;
        let model = self.registry.require().await?;
        let size = PlotSize::new(self.config.plot_width, self.config.plot_height);

        with_timing("forecast_plot", || async move {
            tokio::task::spawn_blocking(move || render(&model, periods, kind, size)).await?
        })
        .await
    }

    /// Renders a chart and writes it atomically to `path`
    pub async fn write_plot(
        &self,
        path: &Path,
        periods: Option<usize>,
        kind: PlotKind,
    ) -> Result<usize, ServiceError> {
        let bytes = self.plot(periods, kind).await?;
        let len = bytes.len();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || persistence::write_atomic(&path, &bytes)).await??;
        Ok(len)
    }

    pub async fn current(&self) -> Option<Arc<TrainedForecaster>> {
        self.registry.current().await
    }

    pub async fn status(&self) -> ModelStatus {
        self.registry.status().await
    }

    fn record_metrics(metrics: ForecastMetrics) {
        MODEL_METRICS.forecaster_mae.set(metrics.mae);
        MODEL_METRICS.forecaster_rmse.set(metrics.rmse);
    }
}

fn render(
    model: &TrainedForecaster,
    periods: usize,
    kind: PlotKind,
    size: PlotSize,
) -> Result<Vec<u8>, ServiceError> {
    let forecast = model.forecast(periods)?;
    let bytes = match kind {
        PlotKind::Forecast { include_history } => {
            let history = include_history.then(|| model.history());
            plotting::render_forecast(history, &forecast, size)?
        }
        PlotKind::Components => {
            // in-sample fit over the stored history tail followed by the horizon
            let points: Vec<ForecastPoint> = model
                .fitted_history()
                .iter()
                .cloned()
                .chain(forecast)
                .collect();
            if points.is_empty() {
                warn!("No points available for the components plot");
            }
            plotting::render_components(&points, size)?
        }
    };
    Ok(bytes)
}
