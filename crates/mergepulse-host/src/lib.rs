#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod fetcher;
pub mod github;
pub mod retry;
pub mod wait;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mergepulse_core::error::PulseError;

pub use fetcher::{FetchSettings, RateLimitedFetcher};
pub use retry::RetryPolicy;
pub use wait::{CancellationToken, TokioWaiter, WaitReason, Waiter};

/// A closed pull request as returned by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePull {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rate limit information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// One page of closed pull requests, newest update first.
#[derive(Debug, Clone, Default)]
pub struct PullPage {
    pub items: Vec<RemotePull>,
    pub has_next: bool,
    /// Quota reported alongside the page, when the API sends it.
    pub quota: Option<RateLimitInfo>,
}

/// The remote API consumed by the fetcher.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Closed pull requests of `repo` (`owner/name`) sorted by last update,
    /// descending. `page` starts at 1.
    async fn list_closed_pulls(
        &self,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PullPage, PulseError>;

    /// Current quota.
    async fn rate_limit_status(&self) -> Result<RateLimitInfo, PulseError>;

    /// Whether `repo` exists and is readable with the configured token.
    async fn validate_repository(&self, repo: &str) -> Result<bool, PulseError>;
}
