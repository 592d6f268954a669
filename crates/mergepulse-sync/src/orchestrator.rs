use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::Instrument;

use mergepulse_core::error::PulseError;
use mergepulse_core::models::pull_request::PullRequestRecord;
use mergepulse_core::models::report::{BatchStatus, FailedRepo, SyncKind, SyncReport, SyncRun};
use mergepulse_core::models::sync_state::{SyncState, SyncStatus};
use mergepulse_core::models::weekly_metric::WeeklyMetric;
use mergepulse_db::SyncStore;
use mergepulse_host::{CancellationToken, RateLimitedFetcher};

use crate::aggregator::ProductivityAggregator;

/// Called with a repository and the number of its pull requests examined
/// so far.
pub type RepoProgress<'a> = dyn Fn(&str, u64) + Send + Sync + 'a;

/// Result of syncing one repository.
#[derive(Debug, Clone)]
pub struct RepoOutcome {
    pub repo: String,
    /// Records persisted by this run.
    pub new_records: usize,
    pub duration: Duration,
    /// Failure message when the repository failed.
    pub error: Option<String>,
}

impl RepoOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
enum Window {
    /// From `since` until now, tracked in sync state.
    Initial { since: DateTime<Utc> },
    /// From the last successful sync until now.
    Incremental,
    /// Explicit bounds; sync state is left alone.
    Period {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl Window {
    fn kind(&self) -> SyncKind {
        match self {
            Window::Initial { .. } => SyncKind::Initial,
            Window::Incremental => SyncKind::Incremental,
            Window::Period { .. } => SyncKind::Period,
        }
    }
}

struct Harvest {
    new_records: usize,
    highest_number: Option<u64>,
}

/// Drives fetch, dedup, aggregation and state updates for each repository.
///
/// Failures of the remote side are isolated to their repository. Storage
/// failures abort the whole batch.
pub struct SyncOrchestrator {
    fetcher: Arc<RateLimitedFetcher>,
    store: Arc<dyn SyncStore>,
    aggregator: ProductivityAggregator,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        store: Arc<dyn SyncStore>,
        aggregator: ProductivityAggregator,
    ) -> Self {
        Self {
            fetcher,
            store,
            aggregator,
        }
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.fetcher.cancellation()
    }

    /// Harvest the last `days_back` days of every repository.
    pub async fn initial_sync(
        &self,
        repos: &[String],
        days_back: u32,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<SyncReport, PulseError> {
        let since = since_days_back(days_back);
        self.run_batch(repos, Window::Initial { since }, progress).await
    }

    /// Harvest everything merged since each repository's last successful
    /// sync. Repositories never synced fail without a fetch.
    pub async fn update_sync(
        &self,
        repos: &[String],
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<SyncReport, PulseError> {
        self.run_batch(repos, Window::Incremental, progress).await
    }

    /// Harvest an explicit window without touching sync state.
    pub async fn fetch_period(
        &self,
        repos: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<SyncReport, PulseError> {
        if from > to {
            return Err(PulseError::Config {
                message: format!("period start {from} is after its end {to}"),
            });
        }
        self.run_batch(repos, Window::Period { from, to }, progress)
            .await
    }

    /// Initial sync of a single repository, without recording a run.
    /// Used by the parallel coordinator.
    pub async fn initial_sync_repo(
        &self,
        repo: &str,
        since: DateTime<Utc>,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<RepoOutcome, PulseError> {
        self.sync_unit(repo, Window::Initial { since }, progress)
            .await
    }

    async fn run_batch(
        &self,
        repos: &[String],
        window: Window,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<SyncReport, PulseError> {
        let kind = window.kind();
        let started = Instant::now();
        let mut report = SyncReport::empty();
        let mut cancelled = false;

        tracing::info!(%kind, repos = repos.len(), "starting sync");

        for (index, repo) in repos.iter().enumerate() {
            tracing::info!(repo = %repo, "processing repository {}/{}", index + 1, repos.len());
            match self.sync_unit(repo, window, progress).await {
                Ok(outcome) => match outcome.error {
                    None => {
                        report.processed_count += 1;
                        report.fetched_count += outcome.new_records;
                    }
                    Some(message) => report.failed_repos.push(FailedRepo {
                        repo: outcome.repo,
                        message,
                    }),
                },
                Err(PulseError::Cancelled) => {
                    tracing::warn!(repo = %repo, "sync cancelled");
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(repo = %repo, error = %e, "aborting batch");
                    return Err(e);
                }
            }
        }

        report.status = if cancelled {
            BatchStatus::Cancelled
        } else {
            BatchStatus::from_failures(report.failed_repos.len())
        };
        report.duration = started.elapsed();

        self.store
            .record_run(&SyncRun::from_report(kind, &report, Utc::now()))?;

        if report.failed_repos.is_empty() {
            tracing::info!(
                %kind,
                status = %report.status,
                processed = report.processed_count,
                fetched = report.fetched_count,
                "sync finished"
            );
        } else {
            let failed: Vec<&str> = report.failed_repos.iter().map(|f| f.repo.as_str()).collect();
            tracing::warn!(
                %kind,
                status = %report.status,
                processed = report.processed_count,
                fetched = report.fetched_count,
                ?failed,
                "sync finished with failures"
            );
        }
        Ok(report)
    }

    /// One repository. `Err` is reserved for cancellation and batch-fatal
    /// errors; everything else comes back as a failed outcome.
    async fn sync_unit(
        &self,
        repo: &str,
        window: Window,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<RepoOutcome, PulseError> {
        let span = tracing::info_span!("sync_repo", repo = %repo, kind = %window.kind());
        async {
            self.cancellation().check()?;
            let started = Instant::now();
            let result = match window {
                Window::Period { from, to } => self
                    .harvest(repo, from, Some(to), progress)
                    .await
                    .map(|h| h.new_records),
                Window::Initial { since } => self.tracked(repo, Some(since), progress).await,
                Window::Incremental => self.tracked(repo, None, progress).await,
            };

            let (new_records, error) = match result {
                Ok(new_records) => (new_records, None),
                Err(e) if e.is_storage() || matches!(e, PulseError::Cancelled) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "repository failed");
                    (0, Some(e.to_string()))
                }
            };
            Ok::<_, PulseError>(RepoOutcome {
                repo: repo.to_string(),
                new_records,
                duration: started.elapsed(),
                error,
            })
        }
        .instrument(span)
        .await
    }

    /// A sync that moves the repository through its state machine.
    /// `since` of `None` means incremental.
    async fn tracked(
        &self,
        repo: &str,
        since: Option<DateTime<Utc>>,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<usize, PulseError> {
        let prior = self.store.get_sync_state(repo)?;

        let since = match since {
            Some(since) => since,
            None => prior
                .as_ref()
                .and_then(SyncState::incremental_since)
                .ok_or_else(|| PulseError::NotInitiallySynced {
                    repo: repo.to_string(),
                })?,
        };

        let mut baseline = prior.unwrap_or_else(|| SyncState::new(repo));
        if baseline.status == SyncStatus::InProgress {
            tracing::warn!("previous sync did not finish");
            baseline.mark_error("previous sync did not finish")?;
        }

        let mut state = baseline.clone();
        state.begin()?;
        self.store.upsert_sync_state(&state)?;

        let synced_at = Utc::now();
        match self.harvest(repo, since, None, progress).await {
            Ok(harvest) => {
                state.mark_completed(synced_at, harvest.highest_number)?;
                self.store.upsert_sync_state(&state)?;
                Ok(harvest.new_records)
            }
            Err(PulseError::Cancelled) => {
                baseline.updated_at = Utc::now();
                self.store.upsert_sync_state(&baseline)?;
                Err(PulseError::Cancelled)
            }
            Err(e) if e.is_storage() => Err(e),
            Err(e) => {
                state.mark_error(e.to_string())?;
                self.store.upsert_sync_state(&state)?;
                Err(e)
            }
        }
    }

    /// Fetch, persist unseen records and persist unseen weekly rows.
    async fn harvest(
        &self,
        repo: &str,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        progress: Option<&RepoProgress<'_>>,
    ) -> Result<Harvest, PulseError> {
        let report = progress.map(|cb| move |seen: u64| cb(repo, seen));
        let fetched = self
            .fetcher
            .fetch_merged_with_progress(
                repo,
                since,
                until,
                report.as_ref().map(|r| r as &mergepulse_host::fetcher::ProgressFn<'_>),
            )
            .await?;

        let highest_number = fetched.iter().map(|r| r.number).max();
        let batch = first_seen(fetched);

        let numbers: Vec<u64> = batch.iter().map(|r| r.number).collect();
        let existing = self.store.existing_keys(repo, &numbers)?;
        let fresh: Vec<PullRequestRecord> = batch
            .iter()
            .filter(|r| !existing.contains(&r.number))
            .cloned()
            .collect();

        if fresh.is_empty() {
            tracing::debug!(fetched = batch.len(), "no new pull requests");
            return Ok(Harvest {
                new_records: 0,
                highest_number,
            });
        }

        self.store.insert_records(&fresh)?;
        tracing::info!(new = fresh.len(), fetched = batch.len(), "saved pull requests");

        let weekly = self.weekly_rows(repo, &batch);
        let week_starts: Vec<NaiveDate> = weekly.iter().map(|w| w.week_start_date).collect();
        let existing_weeks = self.store.existing_week_keys(repo, &week_starts)?;
        let new_weeks: Vec<WeeklyMetric> = weekly
            .into_iter()
            .filter(|w| !existing_weeks.contains(&w.week_start_date))
            .collect();
        if !new_weeks.is_empty() {
            self.store.insert_weekly_metrics(&new_weeks)?;
            tracing::debug!(weeks = new_weeks.len(), "saved weekly metrics");
        }

        Ok(Harvest {
            new_records: fresh.len(),
            highest_number,
        })
    }

    fn weekly_rows(&self, repo: &str, records: &[PullRequestRecord]) -> Vec<WeeklyMetric> {
        let mut rows = self.aggregator.weekly_metrics(records);
        for row in &mut rows {
            row.repo = repo.to_string();
        }
        rows
    }
}

/// Drop repeated pull request numbers, keeping the first occurrence.
fn first_seen(records: Vec<PullRequestRecord>) -> Vec<PullRequestRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.number))
        .collect()
}

/// `now - days_back` days.
pub fn since_days_back(days_back: u32) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(i64::from(days_back))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mergepulse_db::{MemoryStore, SqliteStore};
    use mergepulse_host::fake::{merged_pull, RecordingWaiter, ScriptedSource};
    use mergepulse_host::{FetchSettings, PullPage};

    struct Harness {
        source: Arc<ScriptedSource>,
        store: Arc<MemoryStore>,
        orchestrator: SyncOrchestrator,
    }

    fn harness() -> Harness {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        let fetcher = RateLimitedFetcher::new(source.clone(), FetchSettings::default())
            .with_waiter(Arc::new(RecordingWaiter::new()));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(fetcher),
            store.clone(),
            ProductivityAggregator::default(),
        );
        Harness {
            source,
            store,
            orchestrator,
        }
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::days(days)
    }

    fn repos(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn transient() -> PulseError {
        PulseError::Transient {
            message: "503 from upstream".into(),
        }
    }

    #[tokio::test]
    async fn test_initial_sync_persists_records_and_state() {
        let h = harness();
        h.source.set_pulls(
            "acme/widgets",
            vec![
                merged_pull(12, "ana", days_ago(1)),
                merged_pull(11, "bo", days_ago(2)),
                merged_pull(7, "ana", days_ago(20)),
            ],
        );

        let report = h
            .orchestrator
            .initial_sync(&repos(&["acme/widgets"]), 30, None)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.fetched_count, 3);
        assert!(report.failed_repos.is_empty());

        let stored = h.store.list_records(Some("acme/widgets")).unwrap();
        assert_eq!(stored.len(), 3);
        assert!(!h.store.weekly_rows("acme/widgets").is_empty());

        let state = h.store.get_sync_state("acme/widgets").unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::Completed);
        assert!(state.last_synced_at.is_some());
        assert_eq!(state.last_pr_number, Some(12));
        assert!(state.error_message.is_none());

        let runs = h.store.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].kind, SyncKind::Initial);
    }

    #[tokio::test]
    async fn test_initial_sync_is_idempotent() {
        let h = harness();
        h.source.set_pulls(
            "acme/widgets",
            vec![
                merged_pull(3, "ana", days_ago(1)),
                merged_pull(2, "bo", days_ago(9)),
                merged_pull(1, "cy", days_ago(16)),
            ],
        );
        let targets = repos(&["acme/widgets"]);

        h.orchestrator.initial_sync(&targets, 30, None).await.unwrap();
        let records_before = h.store.list_records(None).unwrap();
        let weekly_before = h.store.weekly_rows("acme/widgets");
        let inserts_before = h.store.insert_counts();

        let second = h.orchestrator.initial_sync(&targets, 30, None).await.unwrap();

        assert_eq!(second.status, BatchStatus::Success);
        assert_eq!(second.fetched_count, 0);
        assert_eq!(h.store.list_records(None).unwrap(), records_before);
        assert_eq!(h.store.weekly_rows("acme/widgets"), weekly_before);
        assert_eq!(h.store.insert_counts(), inserts_before);
    }

    #[tokio::test]
    async fn test_first_seen_record_wins() {
        let h = harness();
        let mut first = merged_pull(5, "ana", days_ago(1));
        first.title = "first".into();
        let mut second = merged_pull(5, "ana", days_ago(1));
        second.title = "second".into();
        h.source.push_page(
            "acme/widgets",
            PullPage {
                items: vec![first],
                has_next: true,
                quota: None,
            },
        );
        h.source.push_page(
            "acme/widgets",
            PullPage {
                items: vec![second],
                has_next: false,
                quota: None,
            },
        );

        let report = h
            .orchestrator
            .initial_sync(&repos(&["acme/widgets"]), 30, None)
            .await
            .unwrap();
        assert_eq!(report.fetched_count, 1);

        // A later batch carrying the same key changes nothing.
        let mut later = merged_pull(5, "ana", days_ago(1));
        later.title = "later".into();
        h.source.set_pulls("acme/widgets", vec![later]);
        h.orchestrator
            .initial_sync(&repos(&["acme/widgets"]), 30, None)
            .await
            .unwrap();

        let stored = h.store.list_records(Some("acme/widgets")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "first");
    }

    #[tokio::test]
    async fn test_failing_repo_is_isolated() {
        let h = harness();
        for _ in 0..3 {
            h.source.push_error("acme/a", transient());
        }
        h.source
            .set_pulls("acme/b", vec![merged_pull(1, "ana", days_ago(3))]);

        let report = h
            .orchestrator
            .initial_sync(&repos(&["acme/a", "acme/b"]), 30, None)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::PartialSuccess);
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.is_failed("acme/a"));
        assert!(report.failed_repos[0].message.contains("503"));
        assert_eq!(h.store.list_records(Some("acme/b")).unwrap().len(), 1);

        let a = h.store.get_sync_state("acme/a").unwrap().unwrap();
        assert_eq!(a.status, SyncStatus::Error);
        assert!(a.error_message.unwrap().contains("503"));
        assert!(a.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_update_requires_initial_sync() {
        let h = harness();
        h.source
            .set_pulls("acme/c", vec![merged_pull(1, "ana", days_ago(1))]);

        let report = h
            .orchestrator
            .update_sync(&repos(&["acme/c"]), None)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::PartialSuccess);
        assert!(report.is_failed("acme/c"));
        assert!(report.failed_repos[0].message.contains("not been initially synced"));
        assert_eq!(h.source.calls_for("acme/c"), 0);
        assert!(h.store.get_sync_state("acme/c").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_from_error_state_fails_fast() {
        let h = harness();
        let mut state = SyncState::new("acme/c");
        state.begin().unwrap();
        state.mark_error("boom").unwrap();
        h.store.upsert_sync_state(&state).unwrap();

        let report = h
            .orchestrator
            .update_sync(&repos(&["acme/c"]), None)
            .await
            .unwrap();
        assert!(report.is_failed("acme/c"));
        assert_eq!(h.source.calls_for("acme/c"), 0);
        assert_eq!(
            h.store.get_sync_state("acme/c").unwrap().unwrap().status,
            SyncStatus::Error
        );
    }

    #[tokio::test]
    async fn test_update_fetches_since_last_sync() {
        let h = harness();
        h.source
            .set_pulls("acme/widgets", vec![merged_pull(1, "ana", days_ago(5))]);
        let targets = repos(&["acme/widgets"]);
        h.orchestrator.initial_sync(&targets, 30, None).await.unwrap();

        let newer = Utc::now();
        h.source.set_pulls(
            "acme/widgets",
            vec![merged_pull(2, "bo", newer), merged_pull(1, "ana", days_ago(5))],
        );
        let report = h.orchestrator.update_sync(&targets, None).await.unwrap();
        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.fetched_count, 1);

        let state = h.store.get_sync_state("acme/widgets").unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::Completed);
        assert_eq!(state.last_pr_number, Some(2));
        assert_eq!(h.store.runs().last().unwrap().kind, SyncKind::Incremental);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_batch() {
        let h = harness();
        h.source
            .set_pulls("acme/a", vec![merged_pull(1, "ana", days_ago(1))]);
        h.source
            .set_pulls("acme/b", vec![merged_pull(1, "bo", days_ago(1))]);
        h.store.set_offline(true);

        let result = h
            .orchestrator
            .initial_sync(&repos(&["acme/a", "acme/b"]), 30, None)
            .await;

        assert!(matches!(result, Err(PulseError::Storage(_))));
        assert_eq!(h.source.calls_for("acme/b"), 0);
    }

    #[tokio::test]
    async fn test_fetch_period_leaves_state_alone() {
        let h = harness();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        h.source.set_pulls(
            "acme/widgets",
            vec![
                merged_pull(4, "ana", Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()),
                merged_pull(3, "bo", Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap()),
                merged_pull(2, "ana", Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()),
            ],
        );

        let report = h
            .orchestrator
            .fetch_period(&repos(&["acme/widgets"]), from, to, None)
            .await
            .unwrap();

        assert_eq!(report.fetched_count, 2);
        assert!(h.store.get_sync_state("acme/widgets").unwrap().is_none());
        assert_eq!(h.store.runs()[0].kind, SyncKind::Period);

        let inverted = h
            .orchestrator
            .fetch_period(&repos(&["acme/widgets"]), to, from, None)
            .await;
        assert!(matches!(inverted, Err(PulseError::Config { .. })));
    }

    #[tokio::test]
    async fn test_existing_weekly_rows_are_not_rewritten() {
        let h = harness();
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let targets = repos(&["acme/widgets"]);

        h.source
            .set_pulls("acme/widgets", vec![merged_pull(1, "ana", monday)]);
        h.orchestrator
            .fetch_period(&targets, from, to, None)
            .await
            .unwrap();

        h.source.set_pulls(
            "acme/widgets",
            vec![
                merged_pull(3, "cy", monday + chrono::Duration::days(7)),
                merged_pull(2, "bo", monday + chrono::Duration::hours(3)),
                merged_pull(1, "ana", monday),
            ],
        );
        h.orchestrator
            .fetch_period(&targets, from, to, None)
            .await
            .unwrap();

        let rows = h.store.weekly_rows("acme/widgets");
        assert_eq!(rows.len(), 2);
        let first = rows
            .iter()
            .find(|r| r.week_start_date == NaiveDate::from_ymd_opt(2024, 3, 11).unwrap())
            .unwrap();
        assert_eq!(first.pr_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_restores_prior_state() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let fetcher = RateLimitedFetcher::new(source.clone(), FetchSettings::default())
            .with_waiter(Arc::new(RecordingWaiter::cancelling(cancel.clone())))
            .with_cancellation(cancel);
        let orchestrator = SyncOrchestrator::new(
            Arc::new(fetcher),
            store.clone(),
            ProductivityAggregator::default(),
        );
        source.set_pulls("acme/b", vec![merged_pull(1, "ana", days_ago(1))]);
        source.push_error("acme/a", transient());

        let report = orchestrator
            .initial_sync(&repos(&["acme/a", "acme/b"]), 30, None)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::Cancelled);
        let a = store.get_sync_state("acme/a").unwrap().unwrap();
        assert_eq!(a.status, SyncStatus::Pending);
        assert!(store.get_sync_state("acme/b").unwrap().is_none());
        assert_eq!(source.calls_for("acme/b"), 0);
        assert_eq!(store.runs()[0].status, BatchStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_progress_reports_repo() {
        let h = harness();
        h.source.set_pulls(
            "acme/widgets",
            vec![merged_pull(2, "ana", days_ago(1)), merged_pull(1, "bo", days_ago(2))],
        );
        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |repo: &str, n: u64| seen.lock().unwrap().push((repo.to_string(), n));

        h.orchestrator
            .initial_sync(&repos(&["acme/widgets"]), 30, Some(&progress))
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(
            seen,
            vec![("acme/widgets".to_string(), 1), ("acme/widgets".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_sqlite_store_end_to_end() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let fetcher = RateLimitedFetcher::new(source.clone(), FetchSettings::default())
            .with_waiter(Arc::new(RecordingWaiter::new()));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(fetcher),
            store.clone(),
            ProductivityAggregator::default(),
        );
        source.set_pulls(
            "acme/widgets",
            vec![merged_pull(2, "ana", days_ago(1)), merged_pull(1, "bo", days_ago(1))],
        );
        let targets = repos(&["acme/widgets"]);

        orchestrator.initial_sync(&targets, 30, None).await.unwrap();
        orchestrator.initial_sync(&targets, 30, None).await.unwrap();
        orchestrator.update_sync(&targets, None).await.unwrap();

        assert_eq!(store.list_records(None).unwrap().len(), 2);
        assert_eq!(store.list_sync_states().unwrap().len(), 1);
    }
}
