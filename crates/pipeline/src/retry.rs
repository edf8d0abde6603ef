//! Retry helper for flaky downstream calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Upper bound for a single exponential backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retries async operations with fixed or exponential backoff.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrySupport;

impl RetrySupport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Call `operation` until it succeeds or `max_retries` attempts have been
    /// made, returning the last error.
    ///
    /// With `exponential`, attempt `n` waits `backoff * 2^(n-1)` (capped at
    /// one minute) before the next try.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        max_retries: u32,
        backoff: Duration,
        exponential: bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_retries = max_retries.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_retries => return Err(err),
                Err(err) => {
                    let delay = Self::delay(attempt, backoff, exponential);
                    warn!(
                        attempt,
                        max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn delay(attempt: u32, backoff: Duration, exponential: bool) -> Duration {
        if !exponential {
            return backoff;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}
