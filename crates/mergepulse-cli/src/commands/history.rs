use clap::Args;
use mergepulse_db::ops;

use super::{dash, open_store};

#[derive(Args)]
pub struct HistoryArgs {
    /// Number of runs to show
    #[arg(long, default_value = "20")]
    limit: u32,
}

pub fn run(args: HistoryArgs) -> anyhow::Result<()> {
    let store = open_store()?;
    let runs = store.with_connection(|conn| ops::list_sync_runs(conn, args.limit))?;

    if runs.is_empty() {
        println!("No sync history found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<16} {:<10} {:<8} {}",
        "STARTED", "KIND", "STATUS", "SYNCED", "NEW PRS", "FAILED"
    );
    for run in &runs {
        let failed = if run.failed_repos.is_empty() {
            dash()
        } else {
            run.failed_repos
                .iter()
                .map(|f| f.repo.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "{:<20} {:<12} {:<16} {:<10} {:<8} {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.kind,
            run.status,
            run.processed_count,
            run.fetched_count,
            failed,
        );
    }

    Ok(())
}
