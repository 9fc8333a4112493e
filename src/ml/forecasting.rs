/*!
 * # Energy Demand Forecasting Model
 *
 * Hourly demand is decomposed with MSTL into a trend and one seasonal series
 * per period (daily 24 h, weekly 168 h, yearly 8766 h). The trend is forecast
 * with a non-seasonal AutoETS model and each seasonal series is carried
 * forward from its last full cycle (`augurs::mstl::MSTLModel`).
 *
 * A period is only modelled when it fits more than twice into the training
 * span. When none do, the series is forecast with a plain AutoETS model and
 * every seasonal component is zero.
 *
 * Training data is resampled onto a contiguous hourly grid first. Missing
 * hours are filled by linear interpolation but do not count towards the
 * training metrics.
 *
 * Fitted augurs models are not serializable, so a snapshot stores the
 * training series and the model is refitted when it is read back. Fitting is
 * deterministic for identical input.
 */

use std::fmt;
use std::sync::Arc;

use augurs::{ets::AutoETS, mstl::MSTLModel, prelude::*, Forecast};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, info};

use super::ModelError;
use crate::config::ForecastConfig;
use crate::models::{ForecastMetrics, ForecastPoint, Observation};

/// Minimum number of observations accepted for fitting
pub const MIN_OBSERVATIONS: usize = 10;

/// Longest training span accepted, in hours (about five years)
pub const MAX_SPAN_HOURS: usize = 5 * YEARLY_PERIOD;

const DAILY_PERIOD: usize = 24;
const WEEKLY_PERIOD: usize = 168;
const YEARLY_PERIOD: usize = 8766;

/// Seasonal periods in the order of `ForecastPoint`'s season fields
const SEASONAL_PERIODS: [usize; 3] = [DAILY_PERIOD, WEEKLY_PERIOD, YEARLY_PERIOD];

/// Settings used for one fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterSettings {
    /// Coverage of the prediction interval, strictly between 0 and 1
    pub interval_width: f64,
    /// Hours of training history kept for plotting
    pub history_hours: usize,
}

impl Default for ForecasterSettings {
    fn default() -> Self {
        Self::from(&ForecastConfig::default())
    }
}

impl From<&ForecastConfig> for ForecasterSettings {
    fn from(cfg: &ForecastConfig) -> Self {
        Self {
            interval_width: cfg.interval_width,
            history_hours: cfg.history_hours,
        }
    }
}

impl ForecasterSettings {
    fn validate(&self) -> Result<(), ModelError> {
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ModelError::InvalidInput(
                "interval_width must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persisted form of a trained forecaster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecasterState {
    settings: ForecasterSettings,
    /// Training series, sorted by timestamp
    series: Vec<Observation>,
    trained_at: DateTime<Utc>,
}

type HorizonFn = dyn Fn(usize) -> Result<Forecast, String> + Send + Sync;

/// A fitted forecaster. Immutable once built.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ForecasterState", into = "ForecasterState")]
pub struct TrainedForecaster {
    state: ForecasterState,
    predict: Arc<HorizonFn>,
    /// Seasonal periods that were modelled, ascending
    periods: Vec<usize>,
    /// Last full cycle of each modelled seasonal series, aligned with `periods`
    seasonal_tails: Vec<Vec<f64>>,
    /// In-sample fit over the last `history_hours` grid slots
    fitted_tail: Vec<ForecastPoint>,
    /// Half width of the fallback interval, used when augurs supplies none
    fallback_half_width: f64,
    metrics: ForecastMetrics,
    last_timestamp: DateTime<Utc>,
}

impl fmt::Debug for TrainedForecaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedForecaster")
            .field("periods", &self.periods)
            .field("observations", &self.state.series.len())
            .field("last_timestamp", &self.last_timestamp)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl TryFrom<ForecasterState> for TrainedForecaster {
    type Error = ModelError;

    fn try_from(state: ForecasterState) -> Result<Self, Self::Error> {
        Self::build(state)
    }
}

impl From<TrainedForecaster> for ForecasterState {
    fn from(model: TrainedForecaster) -> Self {
        model.state
    }
}

fn numerical(err: impl fmt::Display) -> ModelError {
    ModelError::Numerical(err.to_string())
}

/// Sorts and checks a training series.
pub fn prepare_series(mut series: Vec<Observation>) -> Result<Vec<Observation>, ModelError> {
    if series.len() < MIN_OBSERVATIONS {
        return Err(ModelError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: series.len(),
        });
    }
    if let Some(bad) = series.iter().find(|o| !o.y.is_finite()) {
        return Err(ModelError::InvalidInput(format!(
            "non-finite demand value at {}",
            bad.ds.to_rfc3339()
        )));
    }

    series.sort_by_key(|o| o.ds);
    if let Some(dup) = series.windows(2).find(|w| w[0].ds == w[1].ds) {
        return Err(ModelError::DuplicateTimestamp(dup[0].ds.to_rfc3339()));
    }
    Ok(series)
}

/// Sorted observations laid out on consecutive hours from the first timestamp
struct HourlyGrid {
    start: DateTime<Utc>,
    values: Vec<f64>,
    observed: Vec<bool>,
}

impl HourlyGrid {
    fn build(series: &[Observation]) -> Result<Self, ModelError> {
        let start = series[0].ds;
        let slot_of =
            |ds: DateTime<Utc>| ((ds - start).num_seconds() as f64 / 3600.0).round() as usize;

        let len = series.last().map_or(0, |o| slot_of(o.ds)) + 1;
        if len > MAX_SPAN_HOURS {
            return Err(ModelError::InvalidInput(format!(
                "series spans {} hours; at most {} are supported",
                len, MAX_SPAN_HOURS
            )));
        }

        let mut values = vec![f64::NAN; len];
        let mut observed = vec![false; len];
        for o in series {
            let slot = slot_of(o.ds);
            if observed[slot] {
                return Err(ModelError::InvalidInput(format!(
                    "more than one observation falls in the hour of {}",
                    o.ds.to_rfc3339()
                )));
            }
            values[slot] = o.y;
            observed[slot] = true;
        }

        let known: Vec<usize> = (0..len).filter(|&i| observed[i]).collect();
        for pair in known.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let step = (values[b] - values[a]) / (b - a) as f64;
            for i in a + 1..b {
                values[i] = values[a] + step * (i - a) as f64;
            }
        }

        let filled = len - known.len();
        if filled > 0 {
            debug!(filled, "Interpolated missing hours in the training series");
        }

        Ok(Self {
            start,
            values,
            observed,
        })
    }

    fn timestamp(&self, slot: usize) -> DateTime<Utc> {
        self.start + Duration::hours(slot as i64)
    }
}

/// Seasonal components of one grid slot or horizon step: daily, weekly, yearly
fn seasonal_components(periods: &[usize], value_for: impl Fn(usize) -> f64) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (k, period) in periods.iter().enumerate() {
        if let Some(slot) = SEASONAL_PERIODS.iter().position(|p| p == period) {
            out[slot] = value_for(k);
        }
    }
    out
}

fn forecast_point(
    ds: DateTime<Utc>,
    yhat: f64,
    interval: Option<(f64, f64)>,
    fallback_half_width: f64,
    seasonal: [f64; 3],
) -> ForecastPoint {
    let (lower, upper) = interval
        .filter(|(lower, upper)| lower.is_finite() && upper.is_finite())
        .unwrap_or((yhat - fallback_half_width, yhat + fallback_half_width));
    ForecastPoint {
        ds,
        yhat,
        yhat_lower: lower.min(yhat),
        yhat_upper: upper.max(yhat),
        trend: yhat - seasonal.iter().sum::<f64>(),
        season_daily: seasonal[0],
        season_weekly: seasonal[1],
        season_yearly: seasonal[2],
    }
}

fn interval_at(forecast: &Forecast, i: usize) -> Option<(f64, f64)> {
    forecast
        .intervals
        .as_ref()
        .and_then(|iv| Some((*iv.lower.get(i)?, *iv.upper.get(i)?)))
}

impl TrainedForecaster {
    /// Fits the model to `series`. The series may be unsorted.
    pub fn fit(series: Vec<Observation>, settings: ForecasterSettings) -> Result<Self, ModelError> {
        Self::build(ForecasterState {
            settings,
            series,
            trained_at: Utc::now(),
        })
    }

    fn build(mut state: ForecasterState) -> Result<Self, ModelError> {
        state.settings.validate()?;
        state.series = prepare_series(std::mem::take(&mut state.series))?;
        let grid = HourlyGrid::build(&state.series)?;
        let n = grid.values.len();
        let level = state.settings.interval_width;

        let periods: Vec<usize> = SEASONAL_PERIODS
            .iter()
            .copied()
            .filter(|p| n > 2 * p)
            .collect();

        let (predict, in_sample, seasonal): (Arc<HorizonFn>, Forecast, Vec<Vec<f64>>) =
            if periods.is_empty() {
                let fitted = AutoETS::non_seasonal().fit(&grid.values).map_err(numerical)?;
                let in_sample = fitted.predict_in_sample(level).map_err(numerical)?;
                let predict: Arc<HorizonFn> = Arc::new(move |horizon: usize| {
                    fitted.predict(horizon, level).map_err(|e| e.to_string())
                });
                (predict, in_sample, Vec::new())
            } else {
                let seasonal = decompose(&grid.values, &periods)?;
                let trend_model = AutoETS::non_seasonal().into_trend_model();
                let fitted = MSTLModel::new(periods.clone(), trend_model)
                    .fit(&grid.values)
                    .map_err(numerical)?;
                let in_sample = fitted.predict_in_sample(level).map_err(numerical)?;
                let predict: Arc<HorizonFn> = Arc::new(move |horizon: usize| {
                    fitted.predict(horizon, level).map_err(|e| e.to_string())
                });
                (predict, in_sample, seasonal)
            };

        if in_sample.point.len() != n {
            return Err(ModelError::Numerical(format!(
                "in-sample fit has {} points for {} training hours",
                in_sample.point.len(),
                n
            )));
        }

        let residuals: Vec<f64> = (0..n)
            .filter(|&i| grid.observed[i])
            .map(|i| in_sample.point[i] - grid.values[i])
            .filter(|r| r.is_finite())
            .collect();
        if residuals.is_empty() {
            return Err(ModelError::Numerical(
                "in-sample fit produced no finite values".to_string(),
            ));
        }
        let count = residuals.len() as f64;
        let metrics = ForecastMetrics {
            mae: residuals.iter().map(|r| r.abs()).sum::<f64>() / count,
            rmse: (residuals.iter().map(|r| r * r).sum::<f64>() / count).sqrt(),
        };
        let resid_mean = residuals.iter().sum::<f64>() / count;
        let residual_std =
            (residuals.iter().map(|r| (r - resid_mean).powi(2)).sum::<f64>() / count).sqrt();
        let z_score = Normal::new(0.0, 1.0)
            .map_err(numerical)?
            .inverse_cdf(0.5 + level / 2.0);
        let fallback_half_width = z_score * residual_std;

        let fitted_tail = (n.saturating_sub(state.settings.history_hours)..n)
            .map(|i| {
                let parts = seasonal_components(&periods, |k| seasonal[k][i]);
                forecast_point(
                    grid.timestamp(i),
                    in_sample.point[i],
                    interval_at(&in_sample, i),
                    fallback_half_width,
                    parts,
                )
            })
            .collect();

        let seasonal_tails = periods
            .iter()
            .zip(&seasonal)
            .map(|(&p, s)| s[n - p..].to_vec())
            .collect();

        let last_timestamp = state.series[state.series.len() - 1].ds;

        info!(
            points = state.series.len(),
            grid_hours = n,
            periods = ?periods,
            mae = metrics.mae,
            rmse = metrics.rmse,
            residual_std,
            "Forecaster fitted"
        );

        Ok(Self {
            state,
            predict,
            periods,
            seasonal_tails,
            fitted_tail,
            fallback_half_width,
            metrics,
            last_timestamp,
        })
    }

    pub fn metrics(&self) -> ForecastMetrics {
        self.metrics
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.last_timestamp
    }

    pub fn n_observations(&self) -> usize {
        self.state.series.len()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.state.trained_at
    }

    pub fn settings(&self) -> &ForecasterSettings {
        &self.state.settings
    }

    /// Seasonal periods, in hours, that the model captures
    pub fn seasonal_periods(&self) -> &[usize] {
        &self.periods
    }

    /// Tail of the training series kept for plotting
    pub fn history(&self) -> &[Observation] {
        let series = &self.state.series;
        &series[series.len().saturating_sub(self.state.settings.history_hours)..]
    }

    /// In-sample fit over the hours covered by `history`
    pub fn fitted_history(&self) -> &[ForecastPoint] {
        &self.fitted_tail
    }

    /// Forecasts `periods` hourly steps following the last training timestamp
    pub fn forecast(&self, periods: usize) -> Result<Vec<ForecastPoint>, ModelError> {
        if periods == 0 {
            return Ok(Vec::new());
        }
        let forecast = (self.predict)(periods).map_err(ModelError::Numerical)?;
        if forecast.point.len() != periods {
            return Err(ModelError::Numerical(format!(
                "model returned {} points for a horizon of {}",
                forecast.point.len(),
                periods
            )));
        }

        Ok(forecast
            .point
            .iter()
            .enumerate()
            .map(|(h, &yhat)| {
                let parts = seasonal_components(&self.periods, |k| {
                    let tail = &self.seasonal_tails[k];
                    tail[h % tail.len()]
                });
                forecast_point(
                    self.last_timestamp + Duration::hours(h as i64 + 1),
                    yhat,
                    interval_at(&forecast, h),
                    self.fallback_half_width,
                    parts,
                )
            })
            .collect())
    }
}

/// MSTL decomposition of `values`; one seasonal series per period
fn decompose(values: &[f64], periods: &[usize]) -> Result<Vec<Vec<f64>>, ModelError> {
    let series: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let result = stlrs::Mstl::params()
        .fit(&series, periods)
        .map_err(numerical)?;

    let seasonal: Vec<Vec<f64>> = result
        .seasonal()
        .iter()
        .map(|s| s.iter().map(|&v| f64::from(v)).collect())
        .collect();
    if seasonal.len() != periods.len() || seasonal.iter().any(|s| s.len() != values.len()) {
        return Err(ModelError::Numerical(
            "seasonal decomposition does not match the requested periods".to_string(),
        ));
    }
    Ok(seasonal)
}
