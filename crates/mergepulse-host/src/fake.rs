//! Scripted stand-ins for the remote API and the timer, used by tests
//! throughout the workspace.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mergepulse_core::error::PulseError;

use crate::wait::{CancellationToken, WaitReason, Waiter};
use crate::{PullPage, PullRequestSource, RateLimitInfo, RemotePull};

/// A [`PullRequestSource`] answering from a per-repository script.
///
/// Queued responses are served first, in order. After that a repository
/// with standing pulls serves them in pages of `per_page`; any other
/// repository answers with an empty last page.
#[derive(Default)]
pub struct ScriptedSource {
    queued: Mutex<HashMap<String, VecDeque<Result<PullPage, PulseError>>>>,
    standing: Mutex<HashMap<String, Vec<RemotePull>>>,
    missing: Mutex<Vec<String>>,
    panicking: Mutex<Vec<String>>,
    quota: Mutex<VecDeque<RateLimitInfo>>,
    calls: Mutex<Vec<(String, u32)>>,
    status_calls: Mutex<u32>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pulls` for `repo` on every call.
    pub fn set_pulls(&self, repo: &str, pulls: Vec<RemotePull>) {
        self.standing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(repo.to_string(), pulls);
    }

    /// Queue one page for `repo`.
    pub fn push_page(&self, repo: &str, page: PullPage) {
        self.push(repo, Ok(page));
    }

    /// Queue one failure for `repo`.
    pub fn push_error(&self, repo: &str, err: PulseError) {
        self.push(repo, Err(err));
    }

    /// Answer 404 for `repo` on every call.
    pub fn set_missing(&self, repo: &str) {
        self.missing.lock().unwrap_or_else(|e| e.into_inner()).push(repo.to_string());
    }

    /// Panic on any page request for `repo`, like a bug inside a worker.
    pub fn set_panicking(&self, repo: &str) {
        self.panicking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(repo.to_string());
    }

    /// Queue a `rate_limit_status` answer. Without one the quota is ample.
    pub fn push_quota(&self, remaining: u32, reset_at: DateTime<Utc>) {
        self.quota.lock().unwrap_or_else(|e| e.into_inner()).push_back(RateLimitInfo {
            limit: 5000,
            remaining,
            reset_at,
        });
    }

    /// Number of page requests made for `repo`.
    pub fn calls_for(&self, repo: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(r, _)| r == repo)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn status_calls(&self) -> u32 {
        *self.status_calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, repo: &str, response: Result<PullPage, PulseError>) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(repo.to_string())
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl PullRequestSource for ScriptedSource {
    async fn list_closed_pulls(
        &self,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PullPage, PulseError> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push((repo.to_string(), page));
        let panics = self
            .panicking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| r == repo);
        if panics {
            panic!("scripted panic for {repo}");
        }

        if let Some(response) = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(repo)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        if self.missing.lock().unwrap_or_else(|e| e.into_inner()).iter().any(|r| r == repo) {
            return Err(PulseError::RepoNotFound {
                repo: repo.to_string(),
            });
        }

        let standing = self.standing.lock().unwrap_or_else(|e| e.into_inner());
        let Some(pulls) = standing.get(repo) else {
            return Ok(PullPage::default());
        };
        let per_page = per_page.max(1) as usize;
        let start = (page.saturating_sub(1) as usize) * per_page;
        let items: Vec<RemotePull> = pulls.iter().skip(start).take(per_page).cloned().collect();
        Ok(PullPage {
            has_next: start + per_page < pulls.len(),
            items,
            quota: None,
        })
    }

    async fn rate_limit_status(&self) -> Result<RateLimitInfo, PulseError> {
        *self.status_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(self
            .quota
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| RateLimitInfo {
                limit: 5000,
                remaining: 5000,
                reset_at: Utc::now(),
            }))
    }

    async fn validate_repository(&self, repo: &str) -> Result<bool, PulseError> {
        Ok(!self.missing.lock().unwrap_or_else(|e| e.into_inner()).iter().any(|r| r == repo))
    }
}

/// A [`Waiter`] that records each requested wait and returns at once.
#[derive(Default)]
pub struct RecordingWaiter {
    waits: Mutex<Vec<(Duration, WaitReason)>>,
    cancel_on_wait: Option<CancellationToken>,
}

impl RecordingWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels `token` on the first wait, as if the user interrupted it.
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            waits: Mutex::new(Vec::new()),
            cancel_on_wait: Some(token),
        }
    }

    pub fn waits(&self) -> Vec<(Duration, WaitReason)> {
        self.waits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Waiter for RecordingWaiter {
    async fn wait(
        &self,
        duration: Duration,
        reason: WaitReason,
        cancel: &CancellationToken,
    ) -> Result<(), PulseError> {
        self.waits.lock().unwrap_or_else(|e| e.into_inner()).push((duration, reason));
        if let Some(token) = &self.cancel_on_wait {
            token.cancel();
        }
        cancel.check()
    }
}

/// Build a merged pull request with every timestamp at `merged_at`.
pub fn merged_pull(number: u64, author: &str, merged_at: DateTime<Utc>) -> RemotePull {
    RemotePull {
        number,
        title: format!("PR #{number}"),
        author: author.to_string(),
        merged_at: Some(merged_at),
        created_at: merged_at - chrono::Duration::hours(1),
        updated_at: merged_at,
    }
}

/// Build a pull request closed without merging.
pub fn closed_pull(number: u64, author: &str, updated_at: DateTime<Utc>) -> RemotePull {
    RemotePull {
        number,
        title: format!("PR #{number}"),
        author: author.to_string(),
        merged_at: None,
        created_at: updated_at - chrono::Duration::hours(1),
        updated_at,
    }
}
