//! Retry policy for remote calls.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use mergepulse_core::config::PulseConfig;
use mergepulse_core::error::PulseError;

use crate::wait::{CancellationToken, WaitReason, Waiter};

/// How often and how long to retry quota and transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Transient failures wait `backoff_factor * 2^retry`.
    pub backoff_factor: Duration,
    /// Added on top of a quota reset time.
    pub safety_margin: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: Duration::from_secs(1),
            safety_margin: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PulseConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_factor: config.backoff_factor(),
            safety_margin: config.quota_safety_margin(),
        }
    }

    /// Backoff before retry number `retry` (zero-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff_factor
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }

    /// Time until `reset_at` plus the safety margin. A reset in the past
    /// still waits the margin.
    pub fn quota_wait(&self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let until_reset = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
        until_reset + self.safety_margin
    }
}

/// Run `operation`, retrying quota and transient failures per `policy`.
///
/// Any other error is returned immediately, as is the last error once the
/// attempts are spent. Waits go through `waiter` and stop early on cancel.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    waiter: &dyn Waiter,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, PulseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PulseError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        cancel.check()?;
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= max_attempts {
            tracing::warn!(label, attempt, error = %err, "giving up after retries");
            return Err(err);
        }

        let (delay, reason) = match &err {
            PulseError::QuotaExceeded { reset_at, .. } => (
                policy.quota_wait(*reset_at, Utc::now()),
                WaitReason::QuotaExceeded,
            ),
            _ => (policy.backoff_for(attempt - 1), WaitReason::Backoff),
        };
        tracing::debug!(label, attempt, ?delay, error = %err, "retrying");
        waiter.wait(delay, reason, cancel).await?;
    }
}
