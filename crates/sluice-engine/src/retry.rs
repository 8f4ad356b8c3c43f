//! Retry-with-backoff policy.
//!
//! [`RetryPolicy::execute`] wraps any fallible operation whose error type
//! implements [`Retryable`]. Transient failures sleep and retry with
//! exponential backoff; everything else is returned on the first attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_types::error::ConnectorError;

/// Upper bound when no `max_delay` is configured: one day.
const MAX_BACKOFF_MS: f64 = 86_400_000.0;

/// Classification the retry loop needs from an error.
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Server-supplied delay that overrides computed backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ConnectorError {
    fn is_transient(&self) -> bool {
        self.retryable
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

/// Retry settings as they appear in pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_delay_ms: None,
        }
    }
}

/// Terminal failure of [`RetryPolicy::execute`].
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error observed.
    pub error: E,
    /// Attempts made, including the final one.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.factor,
            max_delay: config.max_delay_ms.map(Duration::from_millis),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    /// (1-based): `base_delay * factor^(attempt-1)`, capped by `max_delay`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_ms = self.base_delay.as_millis() as f64;
        let cap_ms = self.max_delay.map_or(MAX_BACKOFF_MS, |d| d.as_millis() as f64);
        let delay_ms = (base_ms * self.factor.max(1.0).powi(exponent)).min(cap_ms);
        // `as` saturates, and a NaN or infinite product was clamped by `min`.
        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Run `op` until it succeeds, fails non-transiently, or exhausts
    /// `max_attempts`. Sleeps the current thread between attempts. On
    /// success returns the value and the number of attempts it took.
    ///
    /// # Errors
    ///
    /// Returns the last error together with the number of attempts made.
    pub fn execute<T, E, F>(&self, operation: &str, mut op: F) -> Result<(T, u32), RetryError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok((value, attempt)),
                Err(error) if !error.is_transient() || attempt >= self.max_attempts => {
                    if error.is_transient() {
                        tracing::error!(
                            operation,
                            attempts = attempt,
                            error = %error,
                            "Retries exhausted"
                        );
                    }
                    return Err(RetryError { error, attempts: attempt });
                }
                Err(error) => {
                    let delay = error.retry_after().unwrap_or_else(|| self.backoff(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Transient failure, retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}
