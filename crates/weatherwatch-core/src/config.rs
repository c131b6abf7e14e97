use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{AppError, ConfigError};

/// Environment variable that overrides `api.api_key`
pub const API_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "WEATHERWATCH_CONFIG";

const PLACEHOLDER_API_KEY: &str = "YOUR_OPENWEATHERMAP_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a summary of all errors joined into one line
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Locations polled every cycle
    #[serde(default)]
    pub locations: Vec<String>,

    /// Upstream weather API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Threshold alerting
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Cycle timing, cache and retry settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Observation store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Alert delivery
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// OpenWeatherMap API key (can be set via `OPENWEATHERMAP_API_KEY`)
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the OpenWeatherMap 2.5 API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for a single network call
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

impl ApiConfig {
    /// Check if a real key is configured (not empty or the placeholder)
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_key.starts_with("YOUR_")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Readings strictly above this raise a high alert (°C)
    pub high_temperature: f64,

    /// Readings strictly below this raise a low alert (°C)
    pub low_temperature: f64,

    /// Breaching readings in a row required before alerting
    pub consecutive_updates: u32,

    /// Largest gap between two readings that still counts as "in a row"
    #[serde(default = "default_max_gap_minutes")]
    pub max_gap_minutes: u32,
}

fn default_max_gap_minutes() -> u32 {
    10
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            high_temperature: 35.0,
            low_temperature: 0.0,
            consecutive_updates: 3,
            max_gap_minutes: default_max_gap_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Sleep between successful cycles
    #[serde(default = "default_update_interval")]
    pub update_interval_seconds: u64,

    /// Sleep after a failed cycle
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Age at which a cached payload is treated as absent
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Network attempts per location per fetch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Courtesy delay between uncached upstream calls
    #[serde(default = "default_request_spacing_ms")]
    pub request_spacing_ms: u64,

    /// Upper bound on in-flight location fetches
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Days of forecast fetched each cycle (0 disables forecasts)
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,

    /// How far back the daily summary window reaches
    #[serde(default = "default_summary_window_hours")]
    pub summary_window_hours: u32,
}

fn default_update_interval() -> u64 {
    300
}

fn default_cooldown() -> u64 {
    60
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_spacing_ms() -> u64 {
    1000
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_forecast_days() -> u32 {
    5
}

fn default_summary_window_hours() -> u32 {
    24
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_seconds: default_update_interval(),
            cooldown_seconds: default_cooldown(),
            cache_ttl_seconds: default_cache_ttl(),
            max_retries: default_max_retries(),
            request_spacing_ms: default_request_spacing_ms(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            forecast_days: default_forecast_days(),
            summary_window_hours: default_summary_window_hours(),
        }
    }
}

impl PollingConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file. Observations are kept in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Alerts are POSTed here as JSON. Alerts are only logged when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from the default location, creating a default
    /// file if it doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`, creating a default file if it doesn't
    /// exist. The API key environment variable takes precedence over the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            Self::from_toml(&contents)?
        } else {
            tracing::info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api.api_key = key;
            }
        }

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from `path` and validate it.
    ///
    /// Returns the config along with any validation warnings.
    /// Returns `AppError::Config` if validation fails with critical errors.
    pub fn load_validated(path: &Path) -> Result<(Self, ValidationResult), AppError> {
        let config = Self::load_from(path).map_err(|e| match e.downcast::<ConfigError>() {
            Ok(config_error) => AppError::Config(config_error),
            Err(other) => AppError::Other(other),
        })?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.api.is_configured() {
            result.add_error(
                "api.api_key",
                format!("API key missing (set it in the file or via {})", API_KEY_ENV),
            );
        }
        Self::validate_url(&self.api.base_url, "api.base_url", &mut result);
        if self.api.timeout_seconds == 0 {
            result.add_error("api.timeout_seconds", "Timeout must be greater than 0");
        }

        if self.locations.is_empty() {
            result.add_error("locations", "At least one location is required");
        } else if self.locations.iter().any(|l| l.trim().is_empty()) {
            result.add_error("locations", "Location names cannot be blank");
        } else {
            let mut seen = HashSet::new();
            for location in &self.locations {
                if !seen.insert(location.trim()) {
                    result.add_error(
                        "locations",
                        format!("Location '{}' is listed more than once", location.trim()),
                    );
                }
            }
        }

        if self.alerts.low_temperature >= self.alerts.high_temperature {
            result.add_error(
                "alerts.low_temperature",
                "Low threshold must be below the high threshold",
            );
        }
        if self.alerts.consecutive_updates == 0 {
            result.add_error(
                "alerts.consecutive_updates",
                "Consecutive updates must be at least 1",
            );
        }

        if self.polling.update_interval_seconds == 0 {
            result.add_error(
                "polling.update_interval_seconds",
                "Update interval must be greater than 0",
            );
        }
        if self.polling.max_retries == 0 {
            result.add_error("polling.max_retries", "At least one attempt is required");
        }
        if self.polling.max_concurrent_fetches == 0 {
            result.add_error(
                "polling.max_concurrent_fetches",
                "Concurrency must be at least 1",
            );
        }
        if self.polling.cache_ttl_seconds > self.polling.update_interval_seconds
            && self.polling.update_interval_seconds > 0
        {
            result.add_warning(
                "polling.cache_ttl_seconds",
                "Cache TTL is longer than the update interval; locations still cached are skipped for that cycle",
            );
        }
        if u64::from(self.alerts.max_gap_minutes) * 60 < self.polling.update_interval_seconds {
            result.add_warning(
                "alerts.max_gap_minutes",
                "Gap tolerance is shorter than the update interval; no run can be consecutive",
            );
        }
        if self.polling.forecast_days > 5 {
            result.add_warning(
                "polling.forecast_days",
                "Upstream serves at most 5 days of forecast",
            );
        }

        if let Some(url) = &self.notifier.webhook_url {
            Self::validate_url(url, "notifier.webhook_url", &mut result);
        }

        result
    }

    /// Validate a URL field
    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Resolve the configuration file path: `WEATHERWATCH_CONFIG` if set,
    /// otherwise `<config dir>/weatherwatch/config.toml`.
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("platform config directory".into()))?
            .join("weatherwatch");

        Ok(config_dir.join("config.toml"))
    }

    /// Log the effective configuration with the API key masked.
    pub fn log_config(&self) {
        let key = &self.api.api_key;
        let masked_key = match key.len().checked_sub(4).and_then(|start| key.get(start..)) {
            Some(tail) if key.len() > 8 => format!("****{}", tail),
            _ => "****".to_string(),
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  api.base_url          : {}", self.api.base_url);
        tracing::info!("  api.api_key           : {}", masked_key);
        tracing::info!("  locations             : {}", self.locations.join(", "));
        tracing::info!(
            "  alerts                : high>{} low<{} x{} within {}m",
            self.alerts.high_temperature,
            self.alerts.low_temperature,
            self.alerts.consecutive_updates,
            self.alerts.max_gap_minutes
        );
        tracing::info!(
            "  polling               : every {}s, cache {}s, {} attempts",
            self.polling.update_interval_seconds,
            self.polling.cache_ttl_seconds,
            self.polling.max_retries
        );
    }
}
