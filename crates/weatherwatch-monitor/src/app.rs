//! Wiring from configuration to a ready-to-run monitor.

use std::sync::Arc;

use anyhow::{Context, Result};
use weatherwatch_core::Config;
use weatherwatch_weather::{FetchSettings, HttpNetwork, ResilientFetcher};

use crate::alerts::{AlertEngine, AlertThresholds};
use crate::monitor::{Monitor, MonitorSettings};
use crate::notifier::AlertNotifier;
use crate::sqlite_store::SqliteStorage;
use crate::storage::{MemoryStorage, Storage};

/// The production monitor: HTTP upstream, configured storage and notifier.
pub type AppMonitor = Monitor<HttpNetwork, AlertNotifier>;

/// Build the monitor described by `config`. The config is assumed to be
/// validated already.
pub fn build_monitor(config: &Config) -> Result<AppMonitor> {
    let network = HttpNetwork::new().context("Failed to create HTTP client")?;
    let fetcher = ResilientFetcher::new(network, FetchSettings::from_config(config));
    let alerts = AlertEngine::new(AlertThresholds::from_config(&config.alerts));
    let storage = open_storage(config)?;
    let notifier = AlertNotifier::from_config(&config.notifier, config.api.timeout())
        .context("Failed to create alert notifier")?;

    tracing::info!(
        "Alerts go to {}",
        if notifier.is_webhook() { "webhook" } else { "log" }
    );

    Ok(Monitor::new(
        fetcher,
        alerts,
        storage,
        notifier,
        MonitorSettings::from_config(config),
    ))
}

/// SQLite when a database path is configured, process memory otherwise.
///
/// The memory store keeps the summary window plus one day of readings, which
/// covers the window's rounding down to midnight.
pub fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match &config.storage.database_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            let store = SqliteStorage::new(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            tracing::info!("Storing observations in {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            let retention = chrono::Duration::hours(i64::from(config.polling.summary_window_hours))
                + chrono::Duration::days(1);
            tracing::info!(
                "No database configured; keeping {}h of observations in memory",
                retention.num_hours()
            );
            Ok(Arc::new(MemoryStorage::with_retention(retention)))
        }
    }
}
