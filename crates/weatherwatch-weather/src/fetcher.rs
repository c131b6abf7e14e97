//! Resilient fetching of current and forecast readings.
//!
//! Each location is fetched by its own task. A task first consults the
//! cache; on a miss it waits for a concurrency permit and its pacing slot,
//! then calls the network port under the retry policy. The batch call
//! returns only once every task has finished, with one outcome per input
//! location in input order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use weatherwatch_core::{AppError, Config, DataError, NetworkError};

use crate::cache::Cache;
use crate::network::Network;
use crate::owm::{self, SAMPLES_PER_DAY};
use crate::retry::{with_retry, RetryConfig, RetryFailure};
use crate::types::RawObservation;

/// Everything the fetcher needs from configuration
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub api_key: String,
    pub base_url: String,
    /// Per network call, independent of the retry envelope
    pub timeout: Duration,
    pub retry: RetryConfig,
    /// Minimum gap between the starts of two uncached calls
    pub request_spacing: Duration,
    pub max_concurrent: usize,
    pub cache_ttl: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        let polling = &config.polling;
        Self {
            api_key: config.api.api_key.clone(),
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            timeout: config.api.timeout(),
            retry: RetryConfig {
                max_retries: polling.max_retries,
                ..RetryConfig::default()
            },
            request_spacing: polling.request_spacing(),
            max_concurrent: polling.max_concurrent_fetches,
            cache_ttl: polling.cache_ttl(),
        }
    }
}

/// Upstream operation, part of the cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Current,
    Forecast { days: u32 },
}

impl Operation {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Current => "weather",
            Self::Forecast { .. } => "forecast",
        }
    }

    pub fn cache_key(&self, location: &str) -> String {
        match self {
            Self::Current => format!("current:{}", location),
            Self::Forecast { days } => format!("forecast:{}:{}", location, days),
        }
    }

    fn params(&self, location: &str, api_key: &str) -> Vec<(String, String)> {
        let mut params = vec![
            ("q".to_string(), location.to_string()),
            ("appid".to_string(), api_key.to_string()),
            ("units".to_string(), "metric".to_string()),
        ];
        if let Self::Forecast { days } = self {
            let count = days.saturating_mul(SAMPLES_PER_DAY);
            params.push(("cnt".to_string(), count.to_string()));
        }
        params
    }
}

/// Why a location produced no readings
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchFailure {
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: NetworkError,
    },

    #[error("malformed payload: {0}")]
    DataShape(#[from] DataError),

    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Result of fetching one location
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Vec<RawObservation>),
    CacheHit(Vec<RawObservation>),
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn observations(&self) -> Option<&[RawObservation]> {
        match self {
            Self::Fetched(obs) | Self::CacheHit(obs) => Some(obs),
            Self::Failed(_) => None,
        }
    }

    pub fn into_observations(self) -> Option<Vec<RawObservation>> {
        match self {
            Self::Fetched(obs) | Self::CacheHit(obs) => Some(obs),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<FetchFailure> for AppError {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Exhausted { last_error, .. } => AppError::Network(last_error),
            FetchFailure::DataShape(e) => AppError::Data(e),
            FetchFailure::Task(message) => {
                AppError::Other(anyhow::anyhow!("fetch task failed: {}", message))
            }
        }
    }
}

struct Inner<N> {
    network: N,
    cache: Cache<Vec<RawObservation>>,
    settings: FetchSettings,
    limiter: Semaphore,
    last_request: Mutex<Option<Instant>>,
}

/// Fetches readings for many locations with caching, retries and a bounded
/// number of in-flight requests.
pub struct ResilientFetcher<N> {
    inner: Arc<Inner<N>>,
}

impl<N> Clone for ResilientFetcher<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N: Network> ResilientFetcher<N> {
    pub fn new(network: N, settings: FetchSettings) -> Self {
        let permits = settings.max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                network,
                cache: Cache::new(settings.cache_ttl),
                limiter: Semaphore::new(permits),
                last_request: Mutex::new(None),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &Cache<Vec<RawObservation>> {
        &self.inner.cache
    }

    /// Drop every cached payload.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        info!("Fetch cache cleared");
    }

    /// Current conditions, one outcome per location in input order.
    pub async fn fetch_current_outcomes(&self, locations: &[String]) -> Vec<(String, FetchOutcome)> {
        self.fetch_all(locations, Operation::Current).await
    }

    /// Current readings for every location that could be fetched.
    /// Failed locations are logged and left out.
    pub async fn fetch_current(&self, locations: &[String]) -> Vec<RawObservation> {
        self.fetch_current_outcomes(locations)
            .await
            .into_iter()
            .filter_map(|(_, outcome)| outcome.into_observations())
            .flatten()
            .collect()
    }

    /// Forecast readings, one outcome per location in input order.
    pub async fn fetch_forecast_outcomes(
        &self,
        locations: &[String],
        days: u32,
    ) -> Vec<(String, FetchOutcome)> {
        self.fetch_all(locations, Operation::Forecast { days }).await
    }

    /// Forecast readings keyed by location. Failed locations are absent.
    pub async fn fetch_forecast(
        &self,
        locations: &[String],
        days: u32,
    ) -> BTreeMap<String, Vec<RawObservation>> {
        self.fetch_forecast_outcomes(locations, days)
            .await
            .into_iter()
            .filter_map(|(location, outcome)| outcome.into_observations().map(|obs| (location, obs)))
            .collect()
    }

    async fn fetch_all(&self, locations: &[String], op: Operation) -> Vec<(String, FetchOutcome)> {
        let mut tasks = JoinSet::new();
        for (index, location) in locations.iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            let location = location.clone();
            tasks.spawn(async move {
                let outcome = inner.fetch_one(&location, op).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<FetchOutcome>> = locations.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => error!("Fetch task failed: {}", e),
            }
        }

        locations
            .iter()
            .cloned()
            .zip(slots)
            .map(|(location, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    FetchOutcome::Failed(FetchFailure::Task("task did not complete".to_string()))
                });
                (location, outcome)
            })
            .collect()
    }
}

impl<N: Network> Inner<N> {
    #[instrument(skip(self))]
    async fn fetch_one(&self, location: &str, op: Operation) -> FetchOutcome {
        let key = op.cache_key(location);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            return FetchOutcome::CacheHit(cached);
        }

        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => return FetchOutcome::Failed(FetchFailure::Task(e.to_string())),
        };
        self.pace().await;

        let url = format!("{}/{}", self.settings.base_url, op.endpoint());
        let params = op.params(location, &self.settings.api_key);
        let timeout = self.settings.timeout;
        let (network, url, params) = (&self.network, url.as_str(), params.as_slice());

        let payload = match with_retry(&self.settings.retry, move || {
            network.get(url, params, timeout)
        })
        .await
        {
            Ok(payload) => payload,
            Err(failure) => {
                let failure = classify(failure);
                error!("Failed to fetch {} for {}: {}", op.endpoint(), location, failure);
                return FetchOutcome::Failed(failure);
            }
        };

        let parsed = match op {
            Operation::Current => owm::parse_current(location, &payload).map(|raw| vec![raw]),
            Operation::Forecast { .. } => owm::parse_forecast(location, &payload),
        };

        match parsed {
            Ok(observations) => {
                self.cache.put(key, observations.clone());
                info!(
                    "Fetched {} reading(s) from {} for {}",
                    observations.len(),
                    op.endpoint(),
                    location
                );
                FetchOutcome::Fetched(observations)
            }
            Err(e) => {
                warn!("Skipping {}: {}", location, e);
                FetchOutcome::Failed(FetchFailure::DataShape(e))
            }
        }
    }

    /// Space out uncached calls. Holding the lock while sleeping queues
    /// later callers behind this one.
    async fn pace(&self) {
        let spacing = self.settings.request_spacing;
        if spacing.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + spacing).await;
        }
        *last = Some(Instant::now());
    }
}

fn classify(failure: RetryFailure) -> FetchFailure {
    match failure {
        RetryFailure::Permanent {
            error: NetworkError::InvalidResponse(message),
            ..
        } => FetchFailure::DataShape(DataError::invalid("payload", message)),
        RetryFailure::Permanent { attempts, error } => FetchFailure::Exhausted {
            attempts,
            last_error: error,
        },
        RetryFailure::Exhausted {
            attempts,
            last_error,
        } => FetchFailure::Exhausted {
            attempts,
            last_error,
        },
    }
}
