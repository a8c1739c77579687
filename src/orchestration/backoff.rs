//! # Backoff Calculator
//!
//! Exponential backoff for retrying work that failed because a collaborator was
//! unavailable.
//!
//! ## Overview
//!
//! The delay before attempt `n + 1` is `base_delay * multiplier^(n - 1)`, capped
//! at `max_delay`. Attempts are 1-based and include the first try, so with
//! `max_attempts = 3` there are at most two delays.

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
        }
    }
}

impl BackoffPolicy {
    /// Single attempt, no delays
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after `attempt` failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        if capped.is_finite() && capped > 0.0 {
            Duration::from_millis(capped as u64)
        } else {
            Duration::ZERO
        }
    }

    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. The last error is returned.
    pub async fn retry<T, E, F, Fut, R>(&self, operation_name: &str, mut operation: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if is_retryable(&error) && self.has_attempts_left(attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔄 Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
