//! Exponential backoff for blocking completions.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::errors::{ZhinaoError, ZhinaoResult};

/// Upper bound of the random extra delay, as a fraction of the backoff.
const JITTER_FRACTION: f64 = 0.25;

/// Backoff settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for any single delay, `retry-after` included.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Adds up to 25% random delay on top of the backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default settings: three retries starting at 500ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings that make a single attempt.
    pub fn no_retries() -> Self {
        Self::default().max_retries(0)
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the first delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Retries an operation while it fails with a transient error.
///
/// An error is transient when [`ZhinaoError::is_retryable`] holds. A
/// `retry-after` hint from the server replaces the computed backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from its settings.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the settings.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out
    /// of retries.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation`.
    #[instrument(skip_all, fields(max_retries = self.config.max_retries))]
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ZhinaoResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ZhinaoResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.config.max_retries {
                warn!(attempts = attempt + 1, error = %err, "Giving up on transient error");
                return Err(err);
            }

            let delay = self.backoff(attempt, &err);
            info!(retry = attempt + 1, ?delay, error = %err, "Retrying completion request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Delay before retry number `attempt + 1`.
    fn backoff(&self, attempt: u32, error: &ZhinaoError) -> Duration {
        let ceiling = self.config.max_delay;
        if let Some(wait) = error.retry_after() {
            return wait.min(ceiling);
        }

        let factor = self.config.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let delay = Duration::try_from_secs_f64(self.config.initial_delay.as_secs_f64() * factor)
            .map_or(ceiling, |d| d.min(ceiling));

        if self.config.jitter {
            let extra = rand::thread_rng().gen_range(0.0..JITTER_FRACTION);
            delay + delay.mul_f64(extra)
        } else {
            delay
        }
    }
}
