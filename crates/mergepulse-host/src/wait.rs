//! Interruptible waits and cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use mergepulse_core::error::PulseError;

/// Cooperative cancellation token shared by every worker of a batch.
///
/// Cloning hands out another handle to the same flag. Once cancelled it
/// stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// `Err(Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<(), PulseError> {
        if self.is_cancelled() {
            Err(PulseError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Why the fetcher is pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Remaining quota fell below the configured buffer.
    QuotaBuffer,
    /// The API rejected a call for exhausted quota.
    QuotaExceeded,
    /// Exponential backoff after a transient failure.
    Backoff,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReason::QuotaBuffer => write!(f, "quota buffer"),
            WaitReason::QuotaExceeded => write!(f, "quota exceeded"),
            WaitReason::Backoff => write!(f, "backoff"),
        }
    }
}

/// Source of delays for the fetcher.
#[async_trait]
pub trait Waiter: Send + Sync {
    /// Sleep for `duration`, returning `Err(Cancelled)` early if `cancel` fires.
    async fn wait(
        &self,
        duration: Duration,
        reason: WaitReason,
        cancel: &CancellationToken,
    ) -> Result<(), PulseError>;
}

/// Real-time waits on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioWaiter;

#[async_trait]
impl Waiter for TokioWaiter {
    async fn wait(
        &self,
        duration: Duration,
        reason: WaitReason,
        cancel: &CancellationToken,
    ) -> Result<(), PulseError> {
        cancel.check()?;
        tracing::info!(?duration, %reason, "pausing requests");
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = cancel.cancelled() => Err(PulseError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_waiter_sleeps_full_duration() {
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        TokioWaiter
            .wait(Duration::from_secs(90), WaitReason::Backoff, &token)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let token = CancellationToken::new();
        let handle = {
            let token = token.clone();
            tokio::spawn(async move {
                TokioWaiter
                    .wait(Duration::from_secs(3600), WaitReason::QuotaBuffer, &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PulseError::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
        token.cancelled().await;

        let result = TokioWaiter
            .wait(Duration::from_secs(1), WaitReason::Backoff, &token)
            .await;
        assert!(matches!(result, Err(PulseError::Cancelled)));
    }
}
