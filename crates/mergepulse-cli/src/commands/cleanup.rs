use chrono::NaiveDate;
use clap::Args;
use console::Term;
use mergepulse_sync::{MetricsService, ProductivityAggregator};

use super::open_store;

#[derive(Args)]
pub struct CleanupArgs {
    /// Delete pull requests merged before this day (YYYY-MM-DD, UTC)
    #[arg(long)]
    before: NaiveDate,
    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
}

pub fn run(args: CleanupArgs) -> anyhow::Result<()> {
    if !args.yes {
        let term = Term::stderr();
        term.write_str(&format!(
            "Delete pull requests merged before {} and their weekly rows? [y/N] ",
            args.before
        ))?;
        let answer = term.read_line()?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let service = MetricsService::new(open_store()?, ProductivityAggregator::default());
    let counts = service.cleanup(args.before)?;
    println!(
        "Deleted {} pull requests and {} weekly rows",
        counts.deleted_prs, counts.deleted_metrics
    );
    Ok(())
}
