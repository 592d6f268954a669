use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use mergepulse_core::config::PulseConfig;
use mergepulse_core::error::PulseError;
use mergepulse_core::models::pull_request::PullRequestRecord;

use crate::retry::{with_retry, RetryPolicy};
use crate::wait::{CancellationToken, TokioWaiter, WaitReason, Waiter};
use crate::{PullRequestSource, RateLimitInfo};

/// Called with the number of pull requests examined so far.
pub type ProgressFn<'a> = dyn Fn(u64) + Send + Sync + 'a;

/// Paging and quota settings for [`RateLimitedFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub per_page: u32,
    /// Pause before a page once remaining quota drops below this.
    pub quota_buffer: u32,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            per_page: 100,
            quota_buffer: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &PulseConfig) -> Self {
        Self {
            per_page: config.per_page.clamp(1, 100),
            quota_buffer: config.quota_buffer,
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Pages through a repository's closed pull requests and keeps the ones
/// merged inside a time window, pausing ahead of quota exhaustion and
/// retrying quota and transient failures.
pub struct RateLimitedFetcher {
    source: Arc<dyn PullRequestSource>,
    waiter: Arc<dyn Waiter>,
    settings: FetchSettings,
    cancel: CancellationToken,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn PullRequestSource>, settings: FetchSettings) -> Self {
        Self {
            source,
            waiter: Arc::new(TokioWaiter),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_waiter(mut self, waiter: Arc<dyn Waiter>) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn source(&self) -> &Arc<dyn PullRequestSource> {
        &self.source
    }

    /// Pull requests of `repo` merged in `[since, until]`, in source order.
    /// `until` defaults to now.
    pub async fn fetch_merged(
        &self,
        repo: &str,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<PullRequestRecord>, PulseError> {
        self.fetch_merged_with_progress(repo, since, until, None)
            .await
    }

    pub async fn fetch_merged_with_progress(
        &self,
        repo: &str,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<Vec<PullRequestRecord>, PulseError> {
        let until = until.unwrap_or_else(Utc::now);
        let mut records = Vec::new();
        let mut seen_numbers = HashSet::new();
        let mut examined = 0u64;
        let mut quota: Option<RateLimitInfo> = None;
        let mut page = 1u32;

        loop {
            self.cancel.check()?;
            self.guard_quota(quota.take()).await?;

            let result = with_retry(&self.settings.retry, self.waiter.as_ref(), &self.cancel, repo, || {
                self.source
                    .list_closed_pulls(repo, page, self.settings.per_page)
            })
            .await?;
            quota = result.quota;

            let page_len = result.items.len();
            let mut past_window = false;
            for pull in result.items {
                examined += 1;
                if let Some(report) = progress {
                    report(examined);
                }

                // Sorted by update time and a merge always bumps it, so
                // nothing older can still have merged inside the window.
                if pull.updated_at < since {
                    past_window = true;
                    break;
                }
                let Some(merged_at) = pull.merged_at else {
                    continue;
                };
                if merged_at < since || merged_at > until {
                    continue;
                }
                // Pages shift when pulls are updated mid-scan.
                if !seen_numbers.insert(pull.number) {
                    continue;
                }
                records.push(PullRequestRecord {
                    repo: repo.to_string(),
                    number: pull.number,
                    author: pull.author,
                    title: pull.title,
                    merged_at: Some(merged_at),
                    created_at: pull.created_at,
                    updated_at: pull.updated_at,
                });
            }

            if past_window || !result.has_next || page_len == 0 {
                break;
            }
            page += 1;
        }

        tracing::debug!(repo, pages = page, examined, merged = records.len(), "fetch finished");
        Ok(records)
    }

    /// Wait out the quota window when fewer than `quota_buffer` calls remain.
    /// `known` is the quota reported by the previous page, if any.
    async fn guard_quota(&self, known: Option<RateLimitInfo>) -> Result<(), PulseError> {
        let info = match known {
            Some(info) => info,
            None => {
                with_retry(
                    &self.settings.retry,
                    self.waiter.as_ref(),
                    &self.cancel,
                    "rate_limit",
                    || self.source.rate_limit_status(),
                )
                .await?
            }
        };

        if info.remaining >= self.settings.quota_buffer {
            return Ok(());
        }

        let delay = self.settings.retry.quota_wait(info.reset_at, Utc::now());
        tracing::warn!(
            remaining = info.remaining,
            buffer = self.settings.quota_buffer,
            reset_at = %info.reset_at,
            ?delay,
            "quota below buffer, waiting for reset"
        );
        self.waiter
            .wait(delay, WaitReason::QuotaBuffer, &self.cancel)
            .await
    }
}
