//! Backoff for idempotent backend calls
//!
//! History and preview fetches go through [`retry_with_backoff_conditional`]
//! with [`is_retryable_error`]. A streamed send is never retried: replaying it
//! would append a second user message on the server.
//!
//! # Examples
//!
//! ```rust,no_run
//! use carabao_chat::retry::{retry_with_backoff, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> carabao_chat::Result<()> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(4)
//!     .with_initial_delay(Duration::from_millis(250));
//!
//! let rows = retry_with_backoff(config, || async { Ok::<_, carabao_chat::Error>(3) }).await?;
//! assert_eq!(rows, 3);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay randomised around its nominal value (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A schedule that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based), capped then jittered.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponential = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let delay = capped + jitter - (jitter_range / 2.0);

        Duration::from_millis(delay.max(0.0) as u64)
    }
}

/// Retries `operation` on every error until it succeeds or attempts run out.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff_conditional(config, operation, |_| true).await
}

/// Retries `operation` while `should_retry` accepts the error.
///
/// Returns the last error once attempts are exhausted, or the first error
/// `should_retry` rejects.
pub async fn retry_with_backoff_conditional<F, Fut, T, P>(
    config: RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts || !should_retry(&e) {
                    return Err(e);
                }

                let delay = config.calculate_delay(attempt - 1);
                debug!(
                    "attempt {}/{} failed ({}); retrying in {:?}",
                    attempt, max_attempts, e, delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// Transient failures: connection problems, timeouts, 5xx and 429.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(_) | Error::Timeout | Error::Stream(_) => true,
        Error::Api { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}
