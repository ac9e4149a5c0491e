use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Tunables for [`RetryPolicy`], loaded from the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the delay (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            jitter: 0.2,
        }
    }
}

/// Bounded retry with exponential backoff and jitter.
///
/// Delay for retry `n` (0-based) is `min(max_delay, base * 2^n) ± jitter`,
/// unless the failed call carried a server "retry after" hint, which is used
/// as-is (still capped at `max_delay`).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    retryable: fn(&Error) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self::new(
            s.max_attempts,
            Duration::from_millis(s.base_delay_ms),
            Duration::from_millis(s.max_delay_ms),
            s.jitter,
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1; negative jitter is clamped to 0.
    pub fn new(max_attempts: u32, base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            retryable: Error::is_retryable,
        }
    }

    /// Replace the retryable-error predicate.
    pub fn with_predicate(mut self, retryable: fn(&Error) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn should_retry(&self, err: &Error) -> bool {
        (self.retryable)(err)
    }

    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }

        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(retry));
        let capped_delay = exp_delay.min(self.max_delay);

        let jitter_range = capped_delay.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((capped_delay.as_secs_f64() + jitter).max(0.0))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.should_retry(&e) => {
                    let delay = self.delay_for(attempt - 1, e.retry_after());
                    warn!(
                        op = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        delay = ?delay,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
