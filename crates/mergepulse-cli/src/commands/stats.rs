use comfy_table::{Cell, CellAlignment, Table};
use mergepulse_sync::{MetricsService, ProductivityAggregator};

use super::open_store;

pub fn run() -> anyhow::Result<()> {
    let service = MetricsService::new(open_store()?, ProductivityAggregator::default());
    let stats = service.repository_stats()?;

    if stats.is_empty() {
        println!("No merged pull requests stored yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["REPOSITORY", "PULL REQUESTS", "AUTHORS"]);
    for s in &stats {
        table.add_row(vec![
            Cell::new(&s.repo),
            Cell::new(s.pr_count).set_alignment(CellAlignment::Right),
            Cell::new(s.unique_authors).set_alignment(CellAlignment::Right),
        ]);
    }

    let total: u64 = stats.iter().map(|s| s.pr_count).sum();
    println!("{table}");
    println!("Total: {} repositories | {} pull requests", stats.len(), total);
    Ok(())
}
