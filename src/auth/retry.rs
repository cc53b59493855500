//! Bounded retry with per-attempt timeout for dependency calls.
//!
//! Every attempt is raced against a timeout. Failed attempts back off
//! exponentially with jitter, capped at `max_delay`. When all attempts are spent
//! the caller gets a [`DependencyError`] and must fail closed.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use super::error::DependencyError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Default policy: 3 attempts, 2s timeout each, 50ms -> 500ms backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(2),
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// # Errors
/// Returns `DependencyError` when every attempt failed or timed out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, DependencyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            let delay = jittered(policy.backoff(attempt - 1));
            warn!(operation, attempt, "Backing off for {:?}", delay);
            sleep(delay).await;
        }

        match timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                error!(operation, attempt, "dependency call failed: {err:#}");
            }
            Err(_) => {
                error!(operation, attempt, "dependency call timed out");
            }
        }
    }

    Err(DependencyError {
        operation: operation.to_string(),
        attempts: policy.attempts,
    })
}

fn jittered(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    delay.mul_f64(rng.gen_range(0.7..1.0))
}
