use comfy_table::{Cell, Color, Table};
use mergepulse_core::models::sync_state::SyncStatus;
use mergepulse_db::SyncStore;

use super::{dash, open_store};

pub fn run() -> anyhow::Result<()> {
    let store = open_store()?;
    let states = store.list_sync_states()?;

    if states.is_empty() {
        println!("No repositories synced yet. Use `mergepulse init` to start.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["REPOSITORY", "STATUS", "LAST SYNC", "LAST PR", "ERROR"]);

    let mut completed = 0usize;
    let mut errors = 0usize;

    for state in &states {
        let color = match state.status {
            SyncStatus::Completed => {
                completed += 1;
                Color::Green
            }
            SyncStatus::Error => {
                errors += 1;
                Color::Red
            }
            SyncStatus::InProgress => Color::Yellow,
            SyncStatus::Pending => Color::White,
        };
        let last_sync = state
            .last_synced_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(dash);
        let last_pr = state
            .last_pr_number
            .map(|n| format!("#{n}"))
            .unwrap_or_else(dash);

        table.add_row(vec![
            Cell::new(&state.repo),
            Cell::new(state.status.to_string()).fg(color),
            Cell::new(last_sync),
            Cell::new(last_pr),
            Cell::new(state.error_message.clone().unwrap_or_default()),
        ]);
    }

    println!("{table}");
    println!(
        "Summary: {} repositories | {} completed | {} errors",
        states.len(),
        completed,
        errors
    );
    Ok(())
}
