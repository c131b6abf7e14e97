//! Storage port and the process-local adapter.
//!
//! The monitor hands every cycle's readings and summaries to a `Storage`
//! and reads back the recent window it summarizes. Readings are keyed by
//! (location, observed_at) and summaries by (location, date); writing the
//! same key twice replaces the earlier row.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use weatherwatch_core::StorageError;
use weatherwatch_weather::{DailySummary, ForecastSummary, NormalizedObservation};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for observation stores.
///
/// Calls are synchronous; the monitor runs them on the blocking pool.
pub trait Storage: Send + Sync {
    /// Persist readings. Re-storing a reading replaces it.
    fn store(&self, observations: &[NormalizedObservation]) -> StorageResult<()>;

    /// Upsert daily summaries by (location, date).
    fn store_summaries(&self, summaries: &[DailySummary]) -> StorageResult<()>;

    /// Upsert forecast summaries by (location, forecast date).
    fn store_forecast_summaries(&self, summaries: &[ForecastSummary]) -> StorageResult<()>;

    /// Readings for `location` observed at or after `since`, oldest first.
    fn recent_window(
        &self,
        location: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<NormalizedObservation>>;

    /// Every location with at least one stored reading, sorted.
    fn list_locations(&self) -> StorageResult<Vec<String>>;

    /// Stored daily summaries for `location`, oldest first, limited to
    /// dates within `from..=to` when either bound is given.
    fn daily_summaries(
        &self,
        location: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StorageResult<Vec<DailySummary>>;

    /// Stored forecast summaries for `location`, oldest first.
    fn forecast_summaries(&self, location: &str) -> StorageResult<Vec<ForecastSummary>>;
}

type DayKey = (String, NaiveDate);

#[derive(Debug, Default)]
struct MemoryState {
    observations: BTreeMap<(String, DateTime<Utc>), NormalizedObservation>,
    summaries: BTreeMap<DayKey, DailySummary>,
    forecasts: BTreeMap<DayKey, ForecastSummary>,
}

/// Storage that lives as long as the process.
///
/// Without a retention every reading is kept. With one, each `store` drops
/// readings older than the newest stored reading minus the retention.
/// Summaries are always kept.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
    retention: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention: Some(retention),
            ..Self::default()
        }
    }

    /// Total stored readings across all locations.
    pub fn observation_count(&self) -> usize {
        self.state.lock().observations.len()
    }
}

impl Storage for MemoryStorage {
    fn store(&self, observations: &[NormalizedObservation]) -> StorageResult<()> {
        let mut state = self.state.lock();
        for obs in observations {
            state
                .observations
                .insert((obs.location.clone(), obs.observed_at), obs.clone());
        }

        if let Some(retention) = self.retention {
            let newest = state.observations.keys().map(|(_, at)| *at).max();
            if let Some(newest) = newest {
                let cutoff = newest - retention;
                state.observations.retain(|(_, at), _| *at >= cutoff);
            }
        }
        Ok(())
    }

    fn store_summaries(&self, summaries: &[DailySummary]) -> StorageResult<()> {
        let mut state = self.state.lock();
        for summary in summaries {
            state
                .summaries
                .insert((summary.location.clone(), summary.date), summary.clone());
        }
        Ok(())
    }

    fn store_forecast_summaries(&self, summaries: &[ForecastSummary]) -> StorageResult<()> {
        let mut state = self.state.lock();
        for summary in summaries {
            state.forecasts.insert(
                (summary.location.clone(), summary.forecast_date),
                summary.clone(),
            );
        }
        Ok(())
    }

    fn recent_window(
        &self,
        location: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<NormalizedObservation>> {
        let state = self.state.lock();
        Ok(state
            .observations
            .range((location.to_string(), since)..)
            .take_while(|((loc, _), _)| loc == location)
            .map(|(_, obs)| obs.clone())
            .collect())
    }

    fn list_locations(&self) -> StorageResult<Vec<String>> {
        let state = self.state.lock();
        let mut locations: Vec<String> = state
            .observations
            .keys()
            .map(|(location, _)| location.clone())
            .collect();
        locations.dedup();
        Ok(locations)
    }

    fn daily_summaries(
        &self,
        location: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StorageResult<Vec<DailySummary>> {
        let state = self.state.lock();
        Ok(state
            .summaries
            .values()
            .filter(|s| s.location == location)
            .filter(|s| from.map_or(true, |from| s.date >= from))
            .filter(|s| to.map_or(true, |to| s.date <= to))
            .cloned()
            .collect())
    }

    fn forecast_summaries(&self, location: &str) -> StorageResult<Vec<ForecastSummary>> {
        let state = self.state.lock();
        Ok(state
            .forecasts
            .values()
            .filter(|s| s.location == location)
            .cloned()
            .collect())
    }
}
