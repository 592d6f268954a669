use std::time::Duration;

use chrono::NaiveDate;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use mergepulse_core::models::report::{BatchStatus, FailedRepo, ParallelSyncReport, SyncReport};
use mergepulse_host::CancellationToken;
use mergepulse_sync::ParallelSyncCoordinator;

use super::{build_orchestrator, cancel_on_ctrl_c, load_config, open_store, target_repos};

#[derive(Args)]
pub struct InitArgs {
    /// Repositories (owner/name); defaults to the configured list
    repos: Vec<String>,
    /// Days of history to fetch
    #[arg(long)]
    days: Option<u32>,
    /// Sync repositories concurrently
    #[arg(long)]
    parallel: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Repositories (owner/name); defaults to the configured list
    repos: Vec<String>,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Repositories (owner/name); defaults to the configured list
    repos: Vec<String>,
    /// First day, YYYY-MM-DD (from 00:00:00 UTC)
    #[arg(long)]
    from: NaiveDate,
    /// Last day, YYYY-MM-DD (until 23:59:59 UTC)
    #[arg(long)]
    to: NaiveDate,
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub async fn run_init(args: InitArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let repos = target_repos(&config, args.repos)?;
    let days = args.days.unwrap_or(config.days_back);
    let store = open_store()?;
    let cancel = CancellationToken::new();
    let orchestrator = build_orchestrator(&config, store, cancel.clone())?;
    let watcher = cancel_on_ctrl_c(cancel);

    println!("Initial sync of {} repositories ({days} days)...", repos.len());

    if args.parallel {
        let coordinator =
            ParallelSyncCoordinator::new(orchestrator, config.max_workers).with_progress(true);
        let report = coordinator.parallel_initial_sync(&repos, days).await;
        watcher.abort();
        print_parallel_report(&report?);
    } else {
        let pb = spinner();
        let progress = progress_for(&pb);
        let report = orchestrator.initial_sync(&repos, days, Some(&progress)).await;
        pb.finish_and_clear();
        watcher.abort();
        print_report(&report?);
    }
    Ok(())
}

pub async fn run_update(args: UpdateArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let repos = target_repos(&config, args.repos)?;
    let store = open_store()?;
    let cancel = CancellationToken::new();
    let orchestrator = build_orchestrator(&config, store, cancel.clone())?;
    let watcher = cancel_on_ctrl_c(cancel);

    println!("Updating {} repositories...", repos.len());

    let pb = spinner();
    let progress = progress_for(&pb);
    let report = orchestrator.update_sync(&repos, Some(&progress)).await;
    pb.finish_and_clear();
    watcher.abort();
    print_report(&report?);
    Ok(())
}

pub async fn run_fetch(args: FetchArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let repos = target_repos(&config, args.repos)?;
    let (from, to) = period_bounds(args.from, args.to)?;
    let store = open_store()?;
    let cancel = CancellationToken::new();
    let orchestrator = build_orchestrator(&config, store, cancel.clone())?;
    let watcher = cancel_on_ctrl_c(cancel);

    println!(
        "Fetching pull requests merged {} to {} for {} repositories...",
        args.from,
        args.to,
        repos.len()
    );

    let pb = spinner();
    let progress = progress_for(&pb);
    let report = orchestrator
        .fetch_period(&repos, from, to, Some(&progress))
        .await;
    pb.finish_and_clear();
    watcher.abort();
    print_report(&report?);
    Ok(())
}

/// Whole days in UTC: `from` 00:00:00 through `to` 23:59:59.
pub fn period_bounds(
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
    if from > to {
        anyhow::bail!("--from {from} is after --to {to}");
    }
    let start = from
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date {from}"))?
        .and_utc();
    let end = to
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow::anyhow!("invalid date {to}"))?
        .and_utc();
    Ok((start, end))
}

fn progress_for(pb: &ProgressBar) -> impl Fn(&str, u64) + Send + Sync {
    let pb = pb.clone();
    move |repo: &str, seen: u64| pb.set_message(format!("{repo}: {seen} pull requests scanned"))
}

fn status_label(status: BatchStatus) -> String {
    match status {
        BatchStatus::Success => style(status.to_string()).green().to_string(),
        BatchStatus::PartialSuccess => style(status.to_string()).yellow().to_string(),
        BatchStatus::Cancelled => style(status.to_string()).red().to_string(),
    }
}

fn print_failures(failed: &[FailedRepo]) {
    if failed.is_empty() {
        return;
    }
    println!("\nFailed repositories:");
    for f in failed {
        println!("  {} {}", style(&f.repo).bold(), f.message);
    }
}

pub fn print_report(report: &SyncReport) {
    println!(
        "\nSync {}: {} succeeded | {} failed | {} new pull requests | {:.1}s",
        status_label(report.status),
        report.processed_count,
        report.failed_count(),
        report.fetched_count,
        report.duration.as_secs_f64()
    );
    print_failures(&report.failed_repos);
}

pub fn print_parallel_report(report: &ParallelSyncReport) {
    println!(
        "\nSync {}: {}/{} succeeded | {} failed | {} new pull requests | {:.1}s (efficiency {:.2})",
        status_label(report.status),
        report.successful_repos.len(),
        report.total_repositories,
        report.failed_repos.len(),
        report.total_fetched,
        report.duration.as_secs_f64(),
        report.parallel_efficiency
    );
    print_failures(&report.failed_repos);
}
