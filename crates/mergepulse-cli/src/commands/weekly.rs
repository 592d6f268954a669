use clap::Args;
use comfy_table::{Cell, CellAlignment, Table};
use mergepulse_sync::{MetricsService, MetricsSummary, ProductivityAggregator};

use super::{load_config, open_store};

#[derive(Args)]
pub struct WeeklyArgs {
    /// Only this repository (owner/name)
    #[arg(long)]
    repo: Option<String>,
    /// Moving average window in weeks
    #[arg(long)]
    window: Option<usize>,
}

pub fn run(args: WeeklyArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let window = args.window.unwrap_or(config.moving_average_window);
    let service = MetricsService::new(
        open_store()?,
        ProductivityAggregator::new(config.display_timezone()?),
    );

    let rows = service.weekly_with_average(args.repo.as_deref(), window)?;
    if rows.is_empty() {
        println!("No merged pull requests stored yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "WEEK".to_string(),
        "PRS".to_string(),
        "AUTHORS".to_string(),
        "PRODUCTIVITY".to_string(),
        format!("{window}W AVG"),
    ]);
    for (week, average) in &rows {
        let productivity = week
            .productivity
            .map(|p| format!("{p:.2}"))
            .unwrap_or_default();
        let average = if average.is_nan() {
            String::new()
        } else {
            format!("{average:.2}")
        };
        table.add_row(vec![
            Cell::new(week.week_range()),
            Cell::new(week.pr_count).set_alignment(CellAlignment::Right),
            Cell::new(week.unique_author_count).set_alignment(CellAlignment::Right),
            Cell::new(productivity).set_alignment(CellAlignment::Right),
            Cell::new(average).set_alignment(CellAlignment::Right),
        ]);
    }

    let weeks: Vec<_> = rows.into_iter().map(|(week, _)| week).collect();
    let summary = MetricsSummary::from_weeks(&weeks);

    println!("{table}");
    println!(
        "{} weeks | {} pull requests | productivity avg {:.2} (min {:.2}, max {:.2}) | {}",
        summary.total_weeks,
        summary.total_prs,
        summary.average_productivity,
        summary.min_productivity,
        summary.max_productivity,
        config.timezone
    );
    Ok(())
}
