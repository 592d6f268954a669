use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;

use mergepulse_core::error::PulseError;

use crate::{PullPage, PullRequestSource, RateLimitInfo, RemotePull};

/// Login reported for pull requests whose author account was deleted.
const GHOST_LOGIN: &str = "ghost";

pub struct GitHubSource {
    client: reqwest::Client,
    api_url: url::Url,
}

impl GitHubSource {
    pub fn new(api_url: url::Url, token: &str, timeout: Duration) -> Result<Self, PulseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            PulseError::Credential {
                message: "token contains characters not allowed in a header".into(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("mergepulse/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PulseError::Config {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self { client, api_url })
    }

    fn url(&self, path: &str) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}{path}")
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, PulseError> {
        self.client.get(url).send().await.map_err(transport_error)
    }
}

#[derive(Deserialize)]
struct GhPull {
    number: u64,
    #[serde(default)]
    title: String,
    user: Option<GhUser>,
    merged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Deserialize)]
struct GhRateLimit {
    rate: GhRate,
}

#[derive(Deserialize)]
struct GhRate {
    limit: u32,
    remaining: u32,
    reset: i64,
}

impl From<GhPull> for RemotePull {
    fn from(p: GhPull) -> Self {
        RemotePull {
            number: p.number,
            title: p.title,
            author: p
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| GHOST_LOGIN.to_string()),
            merged_at: p.merged_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

fn transport_error(e: reqwest::Error) -> PulseError {
    let kind = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    PulseError::Transient {
        message: format!("{kind}: {e}"),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Quota advertised by the `x-ratelimit-*` response headers.
pub fn quota_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let limit = header_u64(headers, "x-ratelimit-limit")?;
    let remaining = header_u64(headers, "x-ratelimit-remaining")?;
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    Some(RateLimitInfo {
        limit: u32::try_from(limit).unwrap_or(u32::MAX),
        remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        reset_at: DateTime::from_timestamp(reset as i64, 0)?,
    })
}

/// Whether a `Link` header carries a `rel="next"` entry.
pub fn has_next_link(link: &str) -> bool {
    link.split(',').any(|part| {
        part.split(';')
            .skip(1)
            .any(|param| param.trim().replace(' ', "") == "rel=\"next\"")
    })
}

/// Map a non-success response to the error taxonomy the fetcher retries on.
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    repo: &str,
    body: &str,
    now: DateTime<Utc>,
) -> PulseError {
    let quota = quota_from_headers(headers);
    let retry_after = header_u64(headers, "retry-after");
    let quota_exhausted = quota.as_ref().is_some_and(|q| q.remaining == 0);

    match status.as_u16() {
        401 => PulseError::AuthFailed {
            message: truncate(body),
        },
        403 | 429 if quota_exhausted || retry_after.is_some() => {
            let reset_at = match (retry_after, quota) {
                (Some(secs), _) => now + chrono::Duration::seconds(secs as i64),
                (None, Some(q)) => q.reset_at,
                (None, None) => now,
            };
            PulseError::QuotaExceeded {
                reset_at,
                remaining: 0,
            }
        }
        429 => PulseError::QuotaExceeded {
            reset_at: now,
            remaining: 0,
        },
        403 => PulseError::AuthFailed {
            message: truncate(body),
        },
        404 => PulseError::RepoNotFound {
            repo: repo.to_string(),
        },
        s if status.is_server_error() => PulseError::Transient {
            message: format!("server returned {s}"),
        },
        s => PulseError::Api {
            status: s,
            message: truncate(body),
        },
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

async fn error_for(resp: reqwest::Response, repo: &str) -> PulseError {
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.text().await.unwrap_or_default();
    classify_status(status, &headers, repo, &body, Utc::now())
}

#[async_trait]
impl PullRequestSource for GitHubSource {
    async fn list_closed_pulls(
        &self,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PullPage, PulseError> {
        let url = format!(
            "{}?state=closed&sort=updated&direction=desc&per_page={per_page}&page={page}",
            self.url(&format!("/repos/{repo}/pulls"))
        );
        let resp = self.get(&url).await?;
        if !resp.status().is_success() {
            return Err(error_for(resp, repo).await);
        }

        let quota = quota_from_headers(resp.headers());
        let has_next = resp
            .headers()
            .get(header::LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(has_next_link);

        let pulls: Vec<GhPull> = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                PulseError::Api {
                    status: 0,
                    message: format!("JSON parse error: {e}"),
                }
            }
        })?;

        tracing::debug!(repo, page, count = pulls.len(), has_next, "fetched pull page");

        Ok(PullPage {
            items: pulls.into_iter().map(RemotePull::from).collect(),
            has_next,
            quota,
        })
    }

    async fn rate_limit_status(&self) -> Result<RateLimitInfo, PulseError> {
        let resp = self.get(&self.url("/rate_limit")).await?;

        // GitHub Enterprise answers 404 when rate limiting is disabled.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(RateLimitInfo {
                limit: u32::MAX,
                remaining: u32::MAX,
                reset_at: Utc::now(),
            });
        }
        if !resp.status().is_success() {
            return Err(error_for(resp, "rate_limit").await);
        }

        let rl: GhRateLimit = resp.json().await.map_err(|e| PulseError::Api {
            status: 0,
            message: format!("JSON parse error: {e}"),
        })?;

        let reset_at = DateTime::from_timestamp(rl.rate.reset, 0).unwrap_or_else(Utc::now);

        Ok(RateLimitInfo {
            limit: rl.rate.limit,
            remaining: rl.rate.remaining,
            reset_at,
        })
    }

    async fn validate_repository(&self, repo: &str) -> Result<bool, PulseError> {
        let resp = self.get(&self.url(&format!("/repos/{repo}"))).await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_for(resp, repo).await),
        }
    }
}
