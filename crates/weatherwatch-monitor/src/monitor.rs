//! The polling cycle.
//!
//! One cycle: fetch current readings, normalize, store, summarize the
//! recent window, check alerts, notify, then fetch and summarize the
//! forecast. Storage and notification failures degrade the cycle but never
//! end it; a cycle only fails when no location could be fetched at all.
//! `run` repeats cycles until the shutdown token fires, checking it only
//! between cycles.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use weatherwatch_core::{AppError, Config, StorageError};
use weatherwatch_weather::{
    daily_summary, forecast_summary, normalize_all, FetchOutcome, Network, NormalizedObservation,
    RawObservation, ResilientFetcher,
};

use crate::alerts::{AlertEngine, AlertEvent};
use crate::notifier::Notifier;
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub locations: Vec<String>,
    pub update_interval: Duration,
    /// Wait after a failed cycle
    pub cooldown: Duration,
    /// Zero disables the forecast step
    pub forecast_days: u32,
    pub summary_window: chrono::Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            locations: config.locations.clone(),
            update_interval: config.polling.update_interval(),
            cooldown: config.polling.cooldown(),
            forecast_days: config.polling.forecast_days,
            summary_window: chrono::Duration::hours(i64::from(config.polling.summary_window_hours)),
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Locations fetched from upstream this cycle
    pub fetched: Vec<String>,
    /// Locations served from the cache
    pub cached: Vec<String>,
    pub failed: Vec<String>,
    pub observations_stored: usize,
    pub daily_summaries: usize,
    pub forecast_summaries: usize,
    pub forecast_failed: Vec<String>,
    pub alerts: Vec<AlertEvent>,
    /// Steps that failed without failing the cycle
    pub degraded: Vec<String>,
}

impl CycleReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty() || !self.failed.is_empty() || !self.forecast_failed.is_empty()
    }
}

/// Start of the summary window: midnight (UTC) of the day containing
/// `now - window`, so every day touched is summarized from all its readings.
pub fn window_start(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    (now - window)
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

pub struct Monitor<N, T> {
    fetcher: ResilientFetcher<N>,
    alerts: AlertEngine,
    storage: Arc<dyn Storage>,
    notifier: T,
    settings: MonitorSettings,
}

impl<N: Network, T: Notifier> Monitor<N, T> {
    pub fn new(
        fetcher: ResilientFetcher<N>,
        alerts: AlertEngine,
        storage: Arc<dyn Storage>,
        notifier: T,
        mut settings: MonitorSettings,
    ) -> Self {
        settings.locations = unique_locations(settings.locations);
        Self {
            fetcher,
            alerts,
            storage,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn fetcher(&self) -> &ResilientFetcher<N> {
        &self.fetcher
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Run cycles until `shutdown` is cancelled. A cycle in progress always
    /// finishes; cancellation only cuts the wait before the next one.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Monitoring {} location(s) every {:?}",
            self.settings.locations.len(),
            self.settings.update_interval
        );

        let mut cycle: u64 = 0;
        while !shutdown.is_cancelled() {
            cycle += 1;
            let wait = match self.run_cycle().await {
                Ok(report) => {
                    if report.is_degraded() {
                        warn!("Cycle {} completed with degraded steps", cycle);
                    }
                    self.settings.update_interval
                }
                Err(e) => {
                    error!("Cycle {} failed: {} ({})", cycle, e, e.user_message());
                    self.settings.cooldown
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Monitor stopped after {} cycle(s)", cycle);
    }

    /// Run one cycle.
    ///
    /// # Errors
    /// Only when every configured location failed to fetch, or a storage
    /// task could not be joined.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, AppError> {
        let started = Utc::now();
        let mut report = CycleReport::default();
        let locations = self.settings.locations.clone();

        let mut fresh: Vec<RawObservation> = Vec::new();
        let mut last_failure = None;
        for (location, outcome) in self.fetcher.fetch_current_outcomes(&locations).await {
            match outcome {
                FetchOutcome::Fetched(raw) => {
                    fresh.extend(raw);
                    report.fetched.push(location);
                }
                FetchOutcome::CacheHit(_) => report.cached.push(location),
                FetchOutcome::Failed(reason) => {
                    warn!("No current reading for {}: {}", location, reason);
                    report.failed.push(location);
                    last_failure = Some(reason);
                }
            }
        }

        if report.fetched.is_empty() && report.cached.is_empty() {
            if let Some(failure) = last_failure {
                warn!("All {} location(s) failed to fetch", locations.len());
                return Err(failure.into());
            }
        }

        // Cached readings were stored and checked when first fetched
        let observations = normalize_all(&fresh);

        if !observations.is_empty() {
            let batch = observations.clone();
            match self.blocking(move |storage| storage.store(&batch)).await? {
                Ok(()) => report.observations_stored = observations.len(),
                Err(e) => {
                    warn!("Failed to store observations: {}", e);
                    report.degraded.push(format!("store: {}", e));
                }
            }
        }

        self.update_daily_summaries(started, &mut report).await?;

        report.alerts = self.alerts.check(&observations);
        if !report.alerts.is_empty() {
            if let Err(e) = self.notifier.send(&report.alerts).await {
                warn!("Failed to deliver {} alert(s): {}", report.alerts.len(), e);
                report.degraded.push(format!("notify: {}", e));
            }
        }

        if self.settings.forecast_days > 0 {
            self.update_forecast(&locations, &mut report).await?;
        }

        info!(
            "Cycle done: {} fetched, {} cached, {} failed, {} alert(s)",
            report.fetched.len(),
            report.cached.len(),
            report.failed.len(),
            report.alerts.len()
        );
        Ok(report)
    }

    async fn update_daily_summaries(
        &self,
        started: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), AppError> {
        let since = window_start(started, self.settings.summary_window);
        let configured: HashSet<String> = self.settings.locations.iter().cloned().collect();
        let this_cycle: Vec<String> = report
            .fetched
            .iter()
            .chain(&report.cached)
            .cloned()
            .collect();

        let (known, windows) = self
            .blocking(move |storage| {
                let known = storage.list_locations();
                let targets: Vec<String> = match &known {
                    Ok(stored) => stored
                        .iter()
                        .filter(|l| configured.contains(*l))
                        .cloned()
                        .collect(),
                    Err(_) => this_cycle,
                };
                let windows: Vec<_> = targets
                    .into_iter()
                    .map(|location| {
                        let window = storage.recent_window(&location, since);
                        (location, window)
                    })
                    .collect();
                (known.err(), windows)
            })
            .await?;

        if let Some(e) = known {
            warn!("Could not list stored locations, summarizing this cycle's: {}", e);
            report.degraded.push(format!("list_locations: {}", e));
        }

        let mut readings: Vec<NormalizedObservation> = Vec::new();
        for (location, window) in windows {
            match window {
                Ok(window) => readings.extend(window),
                Err(e) => {
                    warn!("Skipping summary for {}: {}", location, e);
                    report.degraded.push(format!("recent_window {}: {}", location, e));
                }
            }
        }

        let summaries = daily_summary(&readings);
        if summaries.is_empty() {
            return Ok(());
        }

        let count = summaries.len();
        match self
            .blocking(move |storage| storage.store_summaries(&summaries))
            .await?
        {
            Ok(()) => report.daily_summaries = count,
            Err(e) => {
                warn!("Failed to store daily summaries: {}", e);
                report.degraded.push(format!("store_summaries: {}", e));
            }
        }
        Ok(())
    }

    async fn update_forecast(
        &self,
        locations: &[String],
        report: &mut CycleReport,
    ) -> Result<(), AppError> {
        let days = self.settings.forecast_days;
        let mut forecasts: BTreeMap<String, Vec<NormalizedObservation>> = BTreeMap::new();

        for (location, outcome) in self.fetcher.fetch_forecast_outcomes(locations, days).await {
            match outcome.into_observations() {
                Some(raw) => {
                    forecasts.insert(location, normalize_all(&raw));
                }
                None => {
                    warn!("No forecast for {}", location);
                    report.forecast_failed.push(location);
                }
            }
        }

        let summaries: Vec<_> = forecast_summary(&forecasts)
            .into_values()
            .flatten()
            .collect();
        if summaries.is_empty() {
            return Ok(());
        }

        let count = summaries.len();
        match self
            .blocking(move |storage| storage.store_forecast_summaries(&summaries))
            .await?
        {
            Ok(()) => report.forecast_summaries = count,
            Err(e) => {
                warn!("Failed to store forecast summaries: {}", e);
                report.degraded.push(format!("store_forecast_summaries: {}", e));
            }
        }
        Ok(())
    }

    /// Run a storage call on the blocking pool.
    async fn blocking<R, F>(&self, op: F) -> Result<R, AppError>
    where
        F: FnOnce(&dyn Storage) -> R + Send + 'static,
        R: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || op(storage.as_ref()))
            .await
            .map_err(|e| AppError::Storage(StorageError::TaskFailed(e.to_string())))
    }
}

/// Drop repeated locations, keeping first-seen order. A repeated location
/// would feed one upstream reading to the alert engine twice.
fn unique_locations(locations: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    locations
        .into_iter()
        .filter(|location| {
            let first = seen.insert(location.clone());
            if !first {
                warn!("Ignoring repeated location {}", location);
            }
            first
        })
        .collect()
}
