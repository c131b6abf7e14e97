//! Weather data for WeatherWatch: the reading model, the resilient fetch
//! layer and the aggregation functions.

pub mod aggregate;
pub mod cache;
pub mod fetcher;
pub mod network;
pub mod owm;
pub mod retry;
pub mod types;

pub use aggregate::{
    daily_summary, forecast_summary, normalize, normalize_all, DEFAULT_HUMIDITY,
    DEFAULT_WIND_SPEED,
};
pub use cache::Cache;
pub use fetcher::{FetchFailure, FetchOutcome, FetchSettings, Operation, ResilientFetcher};
pub use network::{HttpNetwork, Network};
pub use retry::{with_retry, RetryConfig, RetryFailure};
pub use types::{
    Condition, DailySummary, ForecastSummary, NormalizedObservation, RawObservation, SummaryStats,
};
