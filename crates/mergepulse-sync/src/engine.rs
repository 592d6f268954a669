use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use mergepulse_core::error::PulseError;
use mergepulse_core::models::report::{BatchStatus, FailedRepo, ParallelSyncReport, SyncRun};
use mergepulse_core::models::sync_state::SyncStatus;

use crate::orchestrator::{since_days_back, RepoOutcome, SyncOrchestrator};

/// Default worker pool size.
pub const DEFAULT_MAX_WORKERS: usize = 8;

enum TaskResult {
    Done(RepoOutcome),
    /// Never started: the run was aborted or cancelled first.
    Skipped,
    Fatal(PulseError),
}

/// Runs initial syncs for many repositories on a bounded worker pool.
///
/// The pool is sized once at construction and shared by every run.
pub struct ParallelSyncCoordinator {
    orchestrator: Arc<SyncOrchestrator>,
    pool: Arc<Semaphore>,
    max_workers: usize,
    show_progress: bool,
}

impl ParallelSyncCoordinator {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            orchestrator,
            pool: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            show_progress: false,
        }
    }

    /// Draw one spinner per repository on stderr.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Initial sync of every repository, at most `max_workers` at a time.
    ///
    /// Repositories are reported in completion order. A storage failure in
    /// any worker stops the remaining ones from starting and is returned.
    pub async fn parallel_initial_sync(
        &self,
        repos: &[String],
        days_back: u32,
    ) -> Result<ParallelSyncReport, PulseError> {
        let started = Instant::now();
        let since = since_days_back(days_back);
        let workers = self.max_workers.min(repos.len().max(1));
        tracing::info!(repos = repos.len(), workers, days_back, "starting parallel sync");

        let multi = if self.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let style = ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        let abort = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for name in repos {
            let pool = self.pool.clone();
            let orchestrator = self.orchestrator.clone();
            let abort = abort.clone();
            let repo = name.clone();
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(style.clone());
            pb.set_message(format!("{repo}: queued"));

            let handle = tasks.spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    return TaskResult::Skipped;
                };
                if abort.load(Ordering::SeqCst) || orchestrator.cancellation().is_cancelled() {
                    pb.finish_and_clear();
                    return TaskResult::Skipped;
                }

                pb.enable_steady_tick(Duration::from_millis(100));
                pb.set_message(format!("{repo}: syncing"));
                let spinner = pb.clone();
                let progress =
                    move |repo: &str, seen: u64| spinner.set_message(format!("{repo}: {seen} scanned"));

                match orchestrator
                    .initial_sync_repo(&repo, since, Some(&progress))
                    .await
                {
                    Ok(outcome) => {
                        let summary = match &outcome.error {
                            None => format!("{repo}: {} new", outcome.new_records),
                            Some(message) => format!("{repo}: failed ({message})"),
                        };
                        pb.finish_with_message(summary);
                        TaskResult::Done(outcome)
                    }
                    Err(PulseError::Cancelled) => {
                        pb.finish_with_message(format!("{repo}: cancelled"));
                        TaskResult::Skipped
                    }
                    Err(e) => {
                        abort.store(true, Ordering::SeqCst);
                        pb.finish_with_message(format!("{repo}: aborted"));
                        TaskResult::Fatal(e)
                    }
                }
            });
            names.insert(handle.id(), name.clone());
        }

        let mut successful_repos = Vec::new();
        let mut failed_repos = Vec::new();
        let mut total_fetched = 0usize;
        let mut busy = Duration::ZERO;
        let mut fatal = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, TaskResult::Done(outcome))) => {
                    busy += outcome.duration;
                    match outcome.error {
                        None => {
                            total_fetched += outcome.new_records;
                            successful_repos.push(outcome.repo);
                        }
                        Some(message) => failed_repos.push(FailedRepo {
                            repo: outcome.repo,
                            message,
                        }),
                    }
                }
                Ok((_, TaskResult::Skipped)) => {}
                Ok((_, TaskResult::Fatal(e))) => {
                    fatal.get_or_insert(e);
                }
                Err(join_err) => {
                    let repo = names.get(&join_err.id()).cloned().unwrap_or_default();
                    tracing::error!(repo = %repo, error = %join_err, "sync worker crashed");
                    let message = format!("worker crashed: {join_err}");
                    if let Err(e) = self.settle_crashed(&repo, &message) {
                        abort.store(true, Ordering::SeqCst);
                        fatal.get_or_insert(e);
                    }
                    failed_repos.push(FailedRepo { repo, message });
                }
            }
        }

        if let Some(e) = fatal {
            tracing::error!(error = %e, "parallel sync aborted");
            return Err(e);
        }

        let duration = started.elapsed();
        let cancelled = self.orchestrator.cancellation().is_cancelled();
        let status = if cancelled {
            BatchStatus::Cancelled
        } else {
            BatchStatus::from_failures(failed_repos.len())
        };
        let parallel_efficiency = if duration.is_zero() {
            0.0
        } else {
            busy.as_secs_f64() / duration.as_secs_f64()
        };

        let report = ParallelSyncReport {
            status,
            total_repositories: repos.len(),
            successful_repos,
            failed_repos,
            total_fetched,
            duration,
            parallel_efficiency,
        };
        self.orchestrator
            .store()
            .record_run(&SyncRun::from_parallel(&report, Utc::now()))?;

        tracing::info!(
            status = %report.status,
            successful = report.successful_repos.len(),
            failed = report.failed_repos.len(),
            fetched = report.total_fetched,
            efficiency = report.parallel_efficiency,
            "parallel sync finished"
        );
        Ok(report)
    }

    /// A crashed worker never finished its unit, so move the repository
    /// out of `in_progress`.
    fn settle_crashed(&self, repo: &str, message: &str) -> Result<(), PulseError> {
        let store = self.orchestrator.store();
        let Some(mut state) = store.get_sync_state(repo)? else {
            return Ok(());
        };
        if state.status == SyncStatus::InProgress {
            state.mark_error(message)?;
            store.upsert_sync_state(&state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ProductivityAggregator;
    use mergepulse_core::models::report::SyncKind;
    use mergepulse_db::{MemoryStore, SyncStore};
    use mergepulse_host::fake::{merged_pull, RecordingWaiter, ScriptedSource};
    use mergepulse_host::{FetchSettings, RateLimitedFetcher};

    fn coordinator(
        source: Arc<ScriptedSource>,
        store: Arc<MemoryStore>,
        workers: usize,
    ) -> ParallelSyncCoordinator {
        let fetcher = RateLimitedFetcher::new(source, FetchSettings::default())
            .with_waiter(Arc::new(RecordingWaiter::new()));
        let orchestrator = SyncOrchestrator::new(
            Arc::new(fetcher),
            store,
            ProductivityAggregator::default(),
        );
        ParallelSyncCoordinator::new(Arc::new(orchestrator), workers)
    }

    fn days_ago(days: i64) -> chrono::DateTime<Utc> {
        Utc::now() - chrono::Duration::days(days)
    }

    #[tokio::test]
    async fn test_parallel_sync_collects_all_repos() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        let repos: Vec<String> = (0..6).map(|i| format!("acme/repo{i}")).collect();
        for (i, repo) in repos.iter().enumerate() {
            let pulls = (1..=(i as u64 + 1))
                .map(|n| merged_pull(n, "ana", days_ago(n as i64)))
                .collect();
            source.set_pulls(repo, pulls);
        }

        let report = coordinator(source, store.clone(), 3)
            .parallel_initial_sync(&repos, 30)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.total_repositories, 6);
        assert_eq!(report.successful_repos.len(), 6);
        assert_eq!(report.total_fetched, 21);
        assert!(report.parallel_efficiency >= 0.0);
        for repo in &repos {
            assert!(report.successful_repos.contains(repo));
            let state = store.get_sync_state(repo).unwrap().unwrap();
            assert_eq!(state.status, SyncStatus::Completed);
        }

        let runs = store.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].kind, SyncKind::Parallel);
    }

    #[tokio::test]
    async fn test_parallel_sync_isolates_missing_repo() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        source.set_missing("acme/gone");
        source.set_pulls("acme/here", vec![merged_pull(1, "ana", days_ago(1))]);

        let repos = vec!["acme/gone".to_string(), "acme/here".to_string()];
        let report = coordinator(source, store.clone(), 8)
            .parallel_initial_sync(&repos, 30)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::PartialSuccess);
        assert_eq!(report.successful_repos, vec!["acme/here".to_string()]);
        assert_eq!(report.failed_repos.len(), 1);
        assert_eq!(report.failed_repos[0].repo, "acme/gone");
        assert_eq!(
            store.get_sync_state("acme/gone").unwrap().unwrap().status,
            SyncStatus::Error
        );
    }

    #[tokio::test]
    async fn test_crashed_worker_leaves_repo_in_error() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        source.set_panicking("acme/boom");
        source.set_pulls("acme/ok", vec![merged_pull(1, "ana", days_ago(1))]);

        let repos = vec!["acme/boom".to_string(), "acme/ok".to_string()];
        let report = coordinator(source, store.clone(), 2)
            .parallel_initial_sync(&repos, 30)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::PartialSuccess);
        assert_eq!(report.successful_repos, vec!["acme/ok".to_string()]);
        assert_eq!(report.failed_repos.len(), 1);
        assert_eq!(report.failed_repos[0].repo, "acme/boom");
        assert!(report.failed_repos[0].message.starts_with("worker crashed"));

        let state = store.get_sync_state("acme/boom").unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::Error);
        assert!(state.error_message.unwrap().starts_with("worker crashed"));
        assert_eq!(
            store.get_sync_state("acme/ok").unwrap().unwrap().status,
            SyncStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_parallel_sync_storage_failure_is_fatal() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        source.set_pulls("acme/a", vec![merged_pull(1, "ana", days_ago(1))]);
        store.set_offline(true);

        let result = coordinator(source, store, 2)
            .parallel_initial_sync(&["acme/a".to_string()], 30)
            .await;
        assert!(matches!(result, Err(PulseError::Storage(_))));
    }

    #[tokio::test]
    async fn test_pool_is_reused_across_runs() {
        let source = Arc::new(ScriptedSource::new());
        let store = Arc::new(MemoryStore::new());
        source.set_pulls("acme/a", vec![merged_pull(1, "ana", days_ago(1))]);
        let coordinator = coordinator(source, store.clone(), 0);
        assert_eq!(coordinator.max_workers(), 1);

        let repos = vec!["acme/a".to_string()];
        coordinator.parallel_initial_sync(&repos, 30).await.unwrap();
        let second = coordinator.parallel_initial_sync(&repos, 30).await.unwrap();

        assert_eq!(second.status, BatchStatus::Success);
        assert_eq!(second.total_fetched, 0);
        assert_eq!(store.runs().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = Arc::new(MemoryStore::new());
        let report = coordinator(Arc::new(ScriptedSource::new()), store, 4)
            .parallel_initial_sync(&[], 30)
            .await
            .unwrap();
        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.total_repositories, 0);
    }
}
