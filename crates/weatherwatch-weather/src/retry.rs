//! Retry utilities for upstream calls with exponential backoff.
//!
//! This module retries transient network failures:
//! - Timeouts
//! - Connection errors
//! - Any non-2xx status
//!
//! It does NOT retry a response body that is not JSON at all.
//!
//! The wait after failed attempt `n` (0-based) is
//! `min(base * 2^n + jitter, max)` with jitter drawn from `[0, max_jitter)`.
//! As long as `max_jitter <= base` the waits never shrink.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use weatherwatch_core::{NetworkError, RetryDecision};

/// Default retry configuration
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
pub const DEFAULT_MAX_JITTER_MS: u64 = 1000;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total network attempts, the first one included
    pub max_retries: u32,
    /// Delay after the first failed attempt (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings and the default jitter
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS.min(base_delay_ms)),
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Delay for a given failed attempt, before jitter
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay for a given failed attempt, jitter included
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let nanos = self.max_jitter.as_nanos().min(u128::from(u64::MAX)) as u64;
            Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
        };
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure {
    /// Every attempt failed with a transient error
    Exhausted { attempts: u32, last_error: NetworkError },
    /// An attempt failed with an error that retrying cannot fix
    Permanent { attempts: u32, error: NetworkError },
}

impl RetryFailure {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Permanent { attempts, .. } => *attempts,
        }
    }

    pub fn error(&self) -> &NetworkError {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Permanent { error, .. } => error,
        }
    }
}

/// Execute an operation with retry logic.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation` - Closure that performs one attempt
///
/// # Returns
/// The successful value, or why the loop gave up
///
/// # Example
/// ```ignore
/// let payload = with_retry(&RetryConfig::default(), || {
///     network.get(url, params, timeout)
/// })
/// .await?;
/// ```
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetworkError>>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if e.retry_decision() == RetryDecision::NoRetry {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(RetryFailure::Permanent {
                        attempts: attempt + 1,
                        error: e,
                    });
                }

                if attempt + 1 >= max_attempts {
                    tracing::error!("All {} attempts exhausted: {}", max_attempts, e);
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt + 1,
                        last_error: e,
                    });
                }

                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    "Retryable error on attempt {} of {}: {}; waiting {:?}",
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
