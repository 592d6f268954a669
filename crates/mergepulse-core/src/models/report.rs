use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a batch sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    /// The run was aborted by the cancellation signal before finishing.
    Cancelled,
}

impl BatchStatus {
    pub fn from_failures(failed: usize) -> Self {
        if failed == 0 {
            BatchStatus::Success
        } else {
            BatchStatus::PartialSuccess
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Success => write!(f, "success"),
            BatchStatus::PartialSuccess => write!(f, "partial_success"),
            BatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(BatchStatus::Success),
            "partial_success" => Ok(BatchStatus::PartialSuccess),
            "cancelled" => Ok(BatchStatus::Cancelled),
            _ => Err(format!("unknown batch status: {s}")),
        }
    }
}

/// A repository that failed within a batch, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRepo {
    pub repo: String,
    pub message: String,
}

/// Result of `initial_sync`, `update_sync` or `fetch_period`.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: BatchStatus,
    pub processed_count: usize,
    /// New pull requests persisted by this run.
    pub fetched_count: usize,
    pub duration: Duration,
    pub failed_repos: Vec<FailedRepo>,
}

impl SyncReport {
    pub fn empty() -> Self {
        Self {
            status: BatchStatus::Success,
            processed_count: 0,
            fetched_count: 0,
            duration: Duration::ZERO,
            failed_repos: Vec::new(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed_repos.len()
    }

    pub fn is_failed(&self, repo: &str) -> bool {
        self.failed_repos.iter().any(|f| f.repo == repo)
    }
}

/// Result of a parallel initial sync across a worker pool.
#[derive(Debug, Clone)]
pub struct ParallelSyncReport {
    pub status: BatchStatus,
    pub total_repositories: usize,
    /// Repositories in completion order.
    pub successful_repos: Vec<String>,
    pub failed_repos: Vec<FailedRepo>,
    pub total_fetched: usize,
    pub duration: Duration,
    /// Sum of per-repository durations over wall-clock time. Informational.
    pub parallel_efficiency: f64,
}

/// Which operation produced a [`SyncRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Initial,
    Incremental,
    Period,
    Parallel,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Initial => write!(f, "initial"),
            SyncKind::Incremental => write!(f, "incremental"),
            SyncKind::Period => write!(f, "period"),
            SyncKind::Parallel => write!(f, "parallel"),
        }
    }
}

impl std::str::FromStr for SyncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(SyncKind::Initial),
            "incremental" => Ok(SyncKind::Incremental),
            "period" => Ok(SyncKind::Period),
            "parallel" => Ok(SyncKind::Parallel),
            _ => Err(format!("unknown sync kind: {s}")),
        }
    }
}

/// History entry for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub kind: SyncKind,
    pub status: BatchStatus,
    pub processed_count: u32,
    pub fetched_count: u32,
    pub failed_repos: Vec<FailedRepo>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncRun {
    pub fn from_report(kind: SyncKind, report: &SyncReport, finished_at: DateTime<Utc>) -> Self {
        let started_at = chrono::Duration::from_std(report.duration)
            .map(|d| finished_at - d)
            .unwrap_or(finished_at);
        Self {
            id: Uuid::now_v7(),
            kind,
            status: report.status,
            processed_count: report.processed_count as u32,
            fetched_count: report.fetched_count as u32,
            failed_repos: report.failed_repos.clone(),
            started_at,
            finished_at,
        }
    }

    pub fn from_parallel(report: &ParallelSyncReport, finished_at: DateTime<Utc>) -> Self {
        let started_at = chrono::Duration::from_std(report.duration)
            .map(|d| finished_at - d)
            .unwrap_or(finished_at);
        Self {
            id: Uuid::now_v7(),
            kind: SyncKind::Parallel,
            status: report.status,
            processed_count: report.successful_repos.len() as u32,
            fetched_count: report.total_fetched as u32,
            failed_repos: report.failed_repos.clone(),
            started_at,
            finished_at,
        }
    }
}
