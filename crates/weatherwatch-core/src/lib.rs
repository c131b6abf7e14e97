//! Configuration, error taxonomy and logging bootstrap shared by the
//! WeatherWatch crates.

pub mod config;
pub mod error;

pub use config::{
    AlertConfig, ApiConfig, Config, NotifierConfig, PollingConfig, StorageConfig,
    ValidationResult,
};
pub use error::{
    AppError, ConfigError, DataError, NetworkError, NotifyError, ReqwestErrorExt, RetryDecision,
    RusqliteErrorExt, StorageError,
};

use anyhow::Result;

/// Initialize process-wide logging.
///
/// `RUST_LOG` takes precedence; the default filter is `info`.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("WeatherWatch core initialized");
    Ok(())
}
