//! The storage port consumed by the sync engine.
//!
//! Every call is atomic: it either commits as a unit or leaves the store
//! untouched. Implementations serialize their own writes so several sync
//! workers can share one store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::Connection;

use mergepulse_core::error::PulseError;
use mergepulse_core::models::pull_request::PullRequestRecord;
use mergepulse_core::models::report::SyncRun;
use mergepulse_core::models::sync_state::SyncState;
use mergepulse_core::models::weekly_metric::WeeklyMetric;

use crate::ops;

pub trait SyncStore: Send + Sync {
    /// Which of `numbers` are already stored for `repo`.
    fn existing_keys(&self, repo: &str, numbers: &[u64]) -> Result<HashSet<u64>, PulseError>;

    fn insert_records(&self, records: &[PullRequestRecord]) -> Result<(), PulseError>;

    /// Which of `week_starts` already have a weekly row for `repo`.
    fn existing_week_keys(
        &self,
        repo: &str,
        week_starts: &[NaiveDate],
    ) -> Result<HashSet<NaiveDate>, PulseError>;

    fn insert_weekly_metrics(&self, rows: &[WeeklyMetric]) -> Result<(), PulseError>;

    fn get_sync_state(&self, repo: &str) -> Result<Option<SyncState>, PulseError>;

    fn upsert_sync_state(&self, state: &SyncState) -> Result<(), PulseError>;

    /// Stored pull requests, optionally for a single repository.
    fn list_records(&self, repo: Option<&str>) -> Result<Vec<PullRequestRecord>, PulseError>;

    fn list_sync_states(&self) -> Result<Vec<SyncState>, PulseError>;

    fn record_run(&self, run: &SyncRun) -> Result<(), PulseError>;
}

fn storage_error(e: impl std::fmt::Display) -> PulseError {
    PulseError::Storage(e.to_string())
}

/// SQLite-backed store. One connection behind a mutex; writes run in a
/// transaction per call.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, PulseError> {
        crate::open_db(path).map(Self::new).map_err(storage_error)
    }

    pub fn open_in_memory() -> Result<Self, PulseError> {
        crate::open_memory_db().map(Self::new).map_err(storage_error)
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> Result<T, PulseError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| PulseError::Storage("connection mutex poisoned".into()))?;
        f(&*conn).map_err(storage_error)
    }

    fn write<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> Result<T, PulseError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| PulseError::Storage("connection mutex poisoned".into()))?;
        let tx = conn.transaction().map_err(storage_error)?;
        let value = f(&*tx).map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;
        Ok(value)
    }

    /// Run `f` against the underlying connection, e.g. for reporting queries.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> Result<T, PulseError> {
        self.read(f)
    }

    /// Run `f` inside a transaction that commits only if it succeeds.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> Result<T, PulseError> {
        self.write(f)
    }
}

impl SyncStore for SqliteStore {
    fn existing_keys(&self, repo: &str, numbers: &[u64]) -> Result<HashSet<u64>, PulseError> {
        if numbers.is_empty() {
            return Ok(HashSet::new());
        }
        self.read(|conn| ops::existing_pr_numbers(conn, repo, numbers))
    }

    fn insert_records(&self, records: &[PullRequestRecord]) -> Result<(), PulseError> {
        if records.is_empty() {
            return Ok(());
        }
        self.write(|conn| {
            for record in records {
                ops::insert_pull_request(conn, record)?;
            }
            Ok(())
        })
    }

    fn existing_week_keys(
        &self,
        repo: &str,
        week_starts: &[NaiveDate],
    ) -> Result<HashSet<NaiveDate>, PulseError> {
        if week_starts.is_empty() {
            return Ok(HashSet::new());
        }
        self.read(|conn| ops::existing_week_starts(conn, repo, week_starts))
    }

    fn insert_weekly_metrics(&self, rows: &[WeeklyMetric]) -> Result<(), PulseError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.write(|conn| {
            for row in rows {
                ops::insert_weekly_metric(conn, row)?;
            }
            Ok(())
        })
    }

    fn get_sync_state(&self, repo: &str) -> Result<Option<SyncState>, PulseError> {
        self.read(|conn| ops::get_sync_state(conn, repo))
    }

    fn upsert_sync_state(&self, state: &SyncState) -> Result<(), PulseError> {
        self.write(|conn| ops::upsert_sync_state(conn, state))
    }

    fn list_records(&self, repo: Option<&str>) -> Result<Vec<PullRequestRecord>, PulseError> {
        self.read(|conn| ops::list_pull_requests(conn, repo))
    }

    fn list_sync_states(&self) -> Result<Vec<SyncState>, PulseError> {
        self.read(ops::list_sync_states)
    }

    fn record_run(&self, run: &SyncRun) -> Result<(), PulseError> {
        self.write(|conn| ops::insert_sync_run(conn, run))
    }
}
