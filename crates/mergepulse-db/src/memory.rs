//! In-memory [`SyncStore`] for tests. Can be switched offline to simulate a
//! broken storage layer.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;

use mergepulse_core::error::PulseError;
use mergepulse_core::models::pull_request::PullRequestRecord;
use mergepulse_core::models::report::SyncRun;
use mergepulse_core::models::sync_state::SyncState;
use mergepulse_core::models::weekly_metric::WeeklyMetric;

use crate::store::SyncStore;

#[derive(Default)]
struct MemoryTables {
    records: BTreeMap<(String, u64), PullRequestRecord>,
    weekly: BTreeMap<(String, NaiveDate), WeeklyMetric>,
    states: BTreeMap<String, SyncState>,
    runs: Vec<SyncRun>,
    record_inserts: usize,
    weekly_inserts: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`PulseError::Storage`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>, PulseError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PulseError::Storage("store is offline".into()));
        }
        Ok(self.tables.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn weekly_rows(&self, repo: &str) -> Vec<WeeklyMetric> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .weekly
            .values()
            .filter(|row| row.repo == repo)
            .cloned()
            .collect()
    }

    pub fn runs(&self) -> Vec<SyncRun> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .runs
            .clone()
    }

    /// Total rows ever inserted as `(records, weekly)`; never decreases.
    pub fn insert_counts(&self) -> (usize, usize) {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        (tables.record_inserts, tables.weekly_inserts)
    }
}

impl SyncStore for MemoryStore {
    fn existing_keys(&self, repo: &str, numbers: &[u64]) -> Result<HashSet<u64>, PulseError> {
        let tables = self.tables()?;
        Ok(numbers
            .iter()
            .copied()
            .filter(|n| tables.records.contains_key(&(repo.to_string(), *n)))
            .collect())
    }

    fn insert_records(&self, records: &[PullRequestRecord]) -> Result<(), PulseError> {
        let mut tables = self.tables()?;
        if let Some(dup) = records
            .iter()
            .find(|r| tables.records.contains_key(&(r.repo.clone(), r.number)))
        {
            return Err(PulseError::Storage(format!(
                "duplicate pull request {}",
                dup.identifier()
            )));
        }
        for record in records {
            tables
                .records
                .insert((record.repo.clone(), record.number), record.clone());
        }
        tables.record_inserts += records.len();
        Ok(())
    }

    fn existing_week_keys(
        &self,
        repo: &str,
        week_starts: &[NaiveDate],
    ) -> Result<HashSet<NaiveDate>, PulseError> {
        let tables = self.tables()?;
        Ok(week_starts
            .iter()
            .copied()
            .filter(|d| tables.weekly.contains_key(&(repo.to_string(), *d)))
            .collect())
    }

    fn insert_weekly_metrics(&self, rows: &[WeeklyMetric]) -> Result<(), PulseError> {
        let mut tables = self.tables()?;
        if let Some(dup) = rows
            .iter()
            .find(|r| tables.weekly.contains_key(&(r.repo.clone(), r.week_start_date)))
        {
            return Err(PulseError::Storage(format!(
                "duplicate weekly row {} {}",
                dup.repo, dup.week_start_date
            )));
        }
        for row in rows {
            tables
                .weekly
                .insert((row.repo.clone(), row.week_start_date), row.clone());
        }
        tables.weekly_inserts += rows.len();
        Ok(())
    }

    fn get_sync_state(&self, repo: &str) -> Result<Option<SyncState>, PulseError> {
        Ok(self.tables()?.states.get(repo).cloned())
    }

    fn upsert_sync_state(&self, state: &SyncState) -> Result<(), PulseError> {
        self.tables()?
            .states
            .insert(state.repo.clone(), state.clone());
        Ok(())
    }

    fn list_records(&self, repo: Option<&str>) -> Result<Vec<PullRequestRecord>, PulseError> {
        Ok(self
            .tables()?
            .records
            .values()
            .filter(|r| repo.map_or(true, |wanted| r.repo == wanted))
            .cloned()
            .collect())
    }

    fn list_sync_states(&self) -> Result<Vec<SyncState>, PulseError> {
        Ok(self.tables()?.states.values().cloned().collect())
    }

    fn record_run(&self, run: &SyncRun) -> Result<(), PulseError> {
        self.tables()?.runs.push(run.clone());
        Ok(())
    }
}
