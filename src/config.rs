use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Low-headroom warning threshold: a validation passes but warns when the
/// available quantity is below `requested * factor`. Policy constant,
/// overridable per deployment.
const DEFAULT_LOW_STOCK_WARNING_FACTOR: f64 = 1.2;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_NUMBER_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_CONFLICT_RETRIES: u32 = 1;

/// Tunables for the reservation ledger and expiry sweeper.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReservationSettings {
    /// Warn (without failing) when available < requested * factor.
    #[serde(default = "default_low_stock_warning_factor")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub low_stock_warning_factor: f64,

    /// How often the expiry sweeper wakes up.
    #[serde(default = "default_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub expiry_sweep_interval_secs: u64,

    /// Attempts at generating a unique reservation number before giving up.
    #[serde(default = "default_number_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub number_max_attempts: u32,

    /// Internal retries on optimistic-concurrency conflicts before the
    /// conflict is surfaced to the caller.
    #[serde(default = "default_conflict_retries")]
    #[validate(range(max = 5))]
    pub conflict_retries: u32,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            low_stock_warning_factor: default_low_stock_warning_factor(),
            expiry_sweep_interval_secs: default_sweep_interval_secs(),
            number_max_attempts: default_number_max_attempts(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Reservation engine tunables
    #[serde(default)]
    #[validate]
    pub reservations: ReservationSettings,
}

impl AppConfig {
    /// Loads configuration from `config/default` + `config/{environment}`
    /// files (both optional) with `STOCKHOLD_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("STOCKHOLD_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
            .add_source(Environment::with_prefix("STOCKHOLD").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;

        info!(
            environment = %app_config.environment,
            auto_migrate = app_config.auto_migrate,
            "Configuration loaded"
        );

        Ok(app_config)
    }

    /// Minimal configuration against an in-memory database, used by tests.
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            environment: "test".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: true,
            reservations: ReservationSettings::default(),
        }
    }
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_low_stock_warning_factor() -> f64 {
    DEFAULT_LOW_STOCK_WARNING_FACTOR
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_number_max_attempts() -> u32 {
    DEFAULT_NUMBER_MAX_ATTEMPTS
}

fn default_conflict_retries() -> u32 {
    DEFAULT_CONFLICT_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::for_tests();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.reservations.low_stock_warning_factor, 1.2);
        assert_eq!(cfg.reservations.conflict_retries, 1);
    }

    #[test]
    fn rejects_out_of_range_warning_factor() {
        let mut cfg = AppConfig::for_tests();
        cfg.reservations.low_stock_warning_factor = 0.5;
        assert!(cfg.validate().is_err());
    }
}
