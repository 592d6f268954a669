use rusqlite::Connection;

use crate::schema;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(schema::CREATE_SCHEMA_VERSION)?;

    let current = get_version(conn)?;

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn get_version(conn: &Connection) -> anyhow::Result<i64> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn set_version(conn: &Connection, version: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Migration v1: pull requests, weekly metrics and sync state.
fn migrate_v1(conn: &Connection) -> anyhow::Result<()> {
    tracing::info!("applying migration v1: initial schema");
    conn.execute_batch(schema::CREATE_PULL_REQUESTS)?;
    conn.execute_batch(schema::CREATE_PULL_REQUEST_INDEXES)?;
    conn.execute_batch(schema::CREATE_WEEKLY_METRICS)?;
    conn.execute_batch(schema::CREATE_SYNC_STATE)?;
    set_version(conn, 1)?;
    Ok(())
}

/// Migration v2: sync run history.
fn migrate_v2(conn: &Connection) -> anyhow::Result<()> {
    tracing::info!("applying migration v2: sync run history");
    conn.execute_batch(schema::CREATE_SYNC_RUNS)?;
    set_version(conn, 2)?;
    Ok(())
}
