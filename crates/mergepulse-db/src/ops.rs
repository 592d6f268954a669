use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use mergepulse_core::models::pull_request::PullRequestRecord;
use mergepulse_core::models::report::{BatchStatus, FailedRepo, SyncKind, SyncRun};
use mergepulse_core::models::sync_state::{SyncState, SyncStatus};
use mergepulse_core::models::weekly_metric::WeeklyMetric;

/// SQLite's default bound-parameter limit is 999; stay well under it.
const MAX_BIND_CHUNK: usize = 500;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Helpers ──

fn fmt_dt(dt: &DateTime<Utc>) -> String {
    // Fixed-width so text comparison in SQL orders chronologically.
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_dt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(fmt_dt)
}

fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_dt(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, s: &str) -> rusqlite::Result<T> {
    s.parse().map_err(|e: String| {
        conversion_error(idx, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn in_list(len: usize) -> String {
    vec!["?"; len].join(", ")
}

// ── Pull requests ──

/// Which of `numbers` are already stored for `repo`. One query per chunk.
pub fn existing_pr_numbers(
    conn: &Connection,
    repo: &str,
    numbers: &[u64],
) -> anyhow::Result<HashSet<u64>> {
    let mut found = HashSet::new();
    for chunk in numbers.chunks(MAX_BIND_CHUNK) {
        let sql = format!(
            "SELECT number FROM pull_requests WHERE repo = ? AND number IN ({})",
            in_list(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind = std::iter::once(Value::from(repo.to_string()))
            .chain(chunk.iter().map(|n| Value::from(*n as i64)));
        let rows = stmt.query_map(params_from_iter(bind), |row| row.get::<_, i64>(0))?;
        for number in rows {
            found.insert(number? as u64);
        }
    }
    Ok(found)
}

pub fn insert_pull_request(conn: &Connection, pr: &PullRequestRecord) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO pull_requests (repo, number, author, title, merged_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            pr.repo,
            pr.number as i64,
            pr.author,
            pr.title,
            opt_dt(&pr.merged_at),
            fmt_dt(&pr.created_at),
            fmt_dt(&pr.updated_at),
        ],
    )?;
    Ok(())
}

/// Stored pull requests, optionally for one repository, oldest merge first.
pub fn list_pull_requests(
    conn: &Connection,
    repo: Option<&str>,
) -> anyhow::Result<Vec<PullRequestRecord>> {
    let mut stmt = conn.prepare(
        "SELECT repo, number, author, title, merged_at, created_at, updated_at
         FROM pull_requests
         WHERE ?1 IS NULL OR repo = ?1
         ORDER BY merged_at, repo, number",
    )?;
    let rows = stmt.query_map(params![repo], row_to_pull_request)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn row_to_pull_request(row: &rusqlite::Row) -> rusqlite::Result<PullRequestRecord> {
    let number: i64 = row.get(1)?;
    let merged_str: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(PullRequestRecord {
        repo: row.get(0)?,
        number: number as u64,
        author: row.get(2)?,
        title: row.get(3)?,
        merged_at: merged_str.map(|s| parse_dt(4, &s)).transpose()?,
        created_at: parse_dt(5, &created_str)?,
        updated_at: parse_dt(6, &updated_str)?,
    })
}

// ── Weekly metrics ──

pub fn existing_week_starts(
    conn: &Connection,
    repo: &str,
    week_starts: &[NaiveDate],
) -> anyhow::Result<HashSet<NaiveDate>> {
    let mut found = HashSet::new();
    for chunk in week_starts.chunks(MAX_BIND_CHUNK) {
        let sql = format!(
            "SELECT week_start_date FROM weekly_metrics WHERE repo = ? AND week_start_date IN ({})",
            in_list(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind = std::iter::once(Value::from(repo.to_string()))
            .chain(chunk.iter().map(|d| Value::from(fmt_date(d))));
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            let s: String = row.get(0)?;
            parse_date(0, &s)
        })?;
        for date in rows {
            found.insert(date?);
        }
    }
    Ok(found)
}

pub fn insert_weekly_metric(conn: &Connection, row: &WeeklyMetric) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO weekly_metrics (repo, week_start_date, pr_count, unique_author_count, productivity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.repo,
            fmt_date(&row.week_start_date),
            row.pr_count,
            row.unique_author_count,
            row.productivity,
            fmt_dt(&Utc::now()),
        ],
    )?;
    Ok(())
}

pub fn list_weekly_metrics(
    conn: &Connection,
    repo: Option<&str>,
) -> anyhow::Result<Vec<WeeklyMetric>> {
    let mut stmt = conn.prepare(
        "SELECT repo, week_start_date, pr_count, unique_author_count, productivity
         FROM weekly_metrics
         WHERE ?1 IS NULL OR repo = ?1
         ORDER BY week_start_date, repo",
    )?;
    let rows = stmt.query_map(params![repo], |row| {
        let week_str: String = row.get(1)?;
        Ok(WeeklyMetric {
            repo: row.get(0)?,
            week_start_date: parse_date(1, &week_str)?,
            pr_count: row.get(2)?,
            unique_author_count: row.get(3)?,
            productivity: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ── Sync state ──

pub fn get_sync_state(conn: &Connection, repo: &str) -> anyhow::Result<Option<SyncState>> {
    let state = conn
        .query_row(
            "SELECT repo, status, last_synced_at, last_pr_number, error_message, updated_at
             FROM sync_state WHERE repo = ?1",
            params![repo],
            row_to_sync_state,
        )
        .optional()?;
    Ok(state)
}

pub fn upsert_sync_state(conn: &Connection, state: &SyncState) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sync_state (repo, status, last_synced_at, last_pr_number, error_message, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (repo) DO UPDATE SET
             status = excluded.status,
             last_synced_at = excluded.last_synced_at,
             last_pr_number = excluded.last_pr_number,
             error_message = excluded.error_message,
             updated_at = excluded.updated_at",
        params![
            state.repo,
            state.status.to_string(),
            opt_dt(&state.last_synced_at),
            state.last_pr_number.map(|n| n as i64),
            state.error_message,
            fmt_dt(&state.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_sync_states(conn: &Connection) -> anyhow::Result<Vec<SyncState>> {
    let mut stmt = conn.prepare(
        "SELECT repo, status, last_synced_at, last_pr_number, error_message, updated_at
         FROM sync_state ORDER BY repo",
    )?;
    let rows = stmt.query_map([], row_to_sync_state)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn row_to_sync_state(row: &rusqlite::Row) -> rusqlite::Result<SyncState> {
    let status_str: String = row.get(1)?;
    let last_synced_str: Option<String> = row.get(2)?;
    let last_pr_number: Option<i64> = row.get(3)?;
    let updated_str: String = row.get(5)?;

    Ok(SyncState {
        repo: row.get(0)?,
        status: parse_enum::<SyncStatus>(1, &status_str)?,
        last_synced_at: last_synced_str.map(|s| parse_dt(2, &s)).transpose()?,
        last_pr_number: last_pr_number.map(|n| n as u64),
        error_message: row.get(4)?,
        updated_at: parse_dt(5, &updated_str)?,
    })
}

// ── Sync runs ──

pub fn insert_sync_run(conn: &Connection, run: &SyncRun) -> anyhow::Result<()> {
    let failed_json = serde_json::to_string(&run.failed_repos)?;
    conn.execute(
        "INSERT INTO sync_runs (id, kind, status, processed_count, fetched_count, failed_repos, started_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run.id.to_string(),
            run.kind.to_string(),
            run.status.to_string(),
            run.processed_count,
            run.fetched_count,
            failed_json,
            fmt_dt(&run.started_at),
            fmt_dt(&run.finished_at),
        ],
    )?;
    Ok(())
}

/// Most recent runs first.
pub fn list_sync_runs(conn: &Connection, limit: u32) -> anyhow::Result<Vec<SyncRun>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, status, processed_count, fetched_count, failed_repos, started_at, finished_at
         FROM sync_runs ORDER BY started_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        let id_str: String = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let status_str: String = row.get(2)?;
        let failed_str: String = row.get(5)?;
        let started_str: String = row.get(6)?;
        let finished_str: String = row.get(7)?;
        Ok(SyncRun {
            id: Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?,
            kind: parse_enum::<SyncKind>(1, &kind_str)?,
            status: parse_enum::<BatchStatus>(2, &status_str)?,
            processed_count: row.get(3)?,
            fetched_count: row.get(4)?,
            failed_repos: serde_json::from_str::<Vec<FailedRepo>>(&failed_str)
                .map_err(|e| conversion_error(5, e))?,
            started_at: parse_dt(6, &started_str)?,
            finished_at: parse_dt(7, &finished_str)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ── Statistics and maintenance ──

/// Per-repository totals over stored pull requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStats {
    pub repo: String,
    pub pr_count: u64,
    pub unique_authors: u64,
}

pub fn repository_stats(conn: &Connection) -> anyhow::Result<Vec<RepoStats>> {
    let mut stmt = conn.prepare(
        "SELECT repo, COUNT(*), COUNT(DISTINCT author)
         FROM pull_requests GROUP BY repo ORDER BY repo",
    )?;
    let rows = stmt.query_map([], |row| {
        let pr_count: i64 = row.get(1)?;
        let unique_authors: i64 = row.get(2)?;
        Ok(RepoStats {
            repo: row.get(0)?,
            pr_count: pr_count as u64,
            unique_authors: unique_authors as u64,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub deleted_prs: usize,
    pub deleted_metrics: usize,
}

/// Delete pull requests merged before `before` (00:00 UTC) and weekly rows
/// whose week starts before it.
pub fn delete_before(conn: &Connection, before: NaiveDate) -> anyhow::Result<CleanupCounts> {
    let cutoff = before.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    let cutoff = cutoff.ok_or_else(|| anyhow::anyhow!("invalid cutoff date {before}"))?;
    let deleted_prs = conn.execute(
        "DELETE FROM pull_requests WHERE merged_at IS NOT NULL AND merged_at < ?1",
        params![fmt_dt(&cutoff)],
    )?;
    let deleted_metrics = conn.execute(
        "DELETE FROM weekly_metrics WHERE week_start_date < ?1",
        params![fmt_date(&before)],
    )?;
    Ok(CleanupCounts {
        deleted_prs,
        deleted_metrics,
    })
}
