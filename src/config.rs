use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MODEL_DIR: &str = "saved_models";
const CONFIG_DIR: &str = "config";

/// Forecaster settings and request limits
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    /// Horizon used when `periods` is not supplied
    #[serde(default = "default_periods")]
    #[validate(range(min = 1, max = 87660))]
    pub default_periods: usize,

    /// Largest horizon a single request may ask for
    #[serde(default = "default_max_periods")]
    #[validate(range(min = 1, max = 87660))]
    pub max_periods: usize,

    /// Coverage of the prediction interval, strictly between 0 and 1
    #[serde(default = "default_interval_width")]
    #[validate(custom = "validate_interval_width")]
    pub interval_width: f64,

    /// Days of synthetic demand generated when no series is supplied
    #[serde(default = "default_sample_days")]
    #[validate(range(min = 1, max = 3650))]
    pub sample_days: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Hours of training history kept for plotting
    #[serde(default = "default_history_hours")]
    pub history_hours: usize,

    #[serde(default = "default_plot_width")]
    #[validate(range(min = 200, max = 4000))]
    pub plot_width: u32,

    #[serde(default = "default_plot_height")]
    #[validate(range(min = 200, max = 4000))]
    pub plot_height: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_periods: default_periods(),
            max_periods: default_max_periods(),
            interval_width: default_interval_width(),
            sample_days: default_sample_days(),
            seed: default_seed(),
            history_hours: default_history_hours(),
            plot_width: default_plot_width(),
            plot_height: default_plot_height(),
        }
    }
}

/// Recommender request limits
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RecommenderConfig {
    #[serde(default = "default_count")]
    #[validate(range(max = 10000))]
    pub default_count: usize,

    #[serde(default = "default_max_count")]
    #[validate(range(min = 1, max = 10000))]
    pub max_count: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port, overridden by `PORT`
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Directory holding the model snapshots
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Train both models on sample data at startup when no snapshot exists
    #[serde(default)]
    pub bootstrap_sample_models: bool,

    /// CORS: comma-separated list of allowed origins; any origin when unset
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_size")]
    #[validate(range(min = 1024))]
    pub max_body_size: usize,

    #[serde(default)]
    #[validate]
    pub forecast: ForecastConfig,

    #[serde(default)]
    #[validate]
    pub recommender: RecommenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            model_dir: default_model_dir(),
            bootstrap_sample_models: false,
            cors_allowed_origins: None,
            max_body_size: default_max_body_size(),
            forecast: ForecastConfig::default(),
            recommender: RecommenderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns the explicitly configured CORS origins, if any
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();

        if self.forecast.default_periods > self.forecast.max_periods {
            let mut err = ValidationError::new("default_periods_exceeds_max");
            err.message = Some("forecast.default_periods must not exceed forecast.max_periods".into());
            errors.add("forecast", err);
        }

        if self.recommender.default_count > self.recommender.max_count {
            let mut err = ValidationError::new("default_count_exceeds_max");
            err.message = Some("recommender.default_count must not exceed recommender.max_count".into());
            errors.add("recommender", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_DIR)
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

fn default_periods() -> usize {
    24
}
fn default_max_periods() -> usize {
    8760
}
fn default_interval_width() -> f64 {
    0.95
}
fn default_sample_days() -> usize {
    60
}
fn default_seed() -> u64 {
    42
}
fn default_history_hours() -> usize {
    168
}
fn default_plot_width() -> u32 {
    1000
}
fn default_plot_height() -> u32 {
    600
}
fn default_count() -> usize {
    5
}
fn default_max_count() -> usize {
    100
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_interval_width(width: f64) -> Result<(), ValidationError> {
    if width.is_finite() && width > 0.0 && width < 1.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("interval_width");
        err.message = Some("Must be strictly between 0 and 1".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("renewable_energy_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

fn base_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("host", default_host())?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("model_dir", DEFAULT_MODEL_DIR)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
/// 5. `PORT`
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory and profile
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let env_file = config_dir.join(run_env);

    let config = base_builder()?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_file.to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_override_option("port", env::var("PORT").ok())?
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration consistency check failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        port = app_config.port,
        model_dir = %app_config.model_dir.display(),
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
