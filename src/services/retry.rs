//! Retry policy for model adapter calls.
//!
//! Transient errors (network, rate limit, timeout) are retried up to
//! `max_retries` times with growing backoff: 2s, 4s, 6s. Permanent errors
//! are surfaced immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::domain::ports::model_adapter::ModelError;

/// Retry policy with growing backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff step; attempt `n` (0-indexed) waits `base * (n + 1)`.
    pub base_backoff: Duration,
    /// Cap on any single backoff wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(6),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            max_backoff,
        }
    }

    /// Backoff before retry `attempt` (0-indexed): 2s, 4s, 6s, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(attempt + 1)
            .min(self.max_backoff)
    }

    /// Execute `operation`, retrying transient [`ModelError`]s.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        return Err(err);
                    }
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient model error, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
