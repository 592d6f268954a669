//! Reporting over stored pull requests.

use std::sync::Arc;

use chrono::NaiveDate;

use mergepulse_core::error::PulseError;
use mergepulse_core::models::weekly_metric::WeeklyMetric;
use mergepulse_db::ops::{self, CleanupCounts, RepoStats};
use mergepulse_db::{SqliteStore, SyncStore};

use crate::aggregator::{moving_average, ProductivityAggregator};

/// Totals over a weekly metrics table. All zero when there are no weeks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSummary {
    pub total_weeks: usize,
    pub total_prs: u64,
    pub average_productivity: f64,
    pub max_productivity: f64,
    pub min_productivity: f64,
}

impl MetricsSummary {
    pub fn from_weeks(weeks: &[WeeklyMetric]) -> Self {
        let mut summary = Self {
            total_weeks: weeks.len(),
            total_prs: weeks.iter().map(|w| u64::from(w.pr_count)).sum(),
            ..Self::default()
        };
        let values: Vec<f64> = weeks.iter().filter_map(|w| w.productivity).collect();
        if !values.is_empty() {
            summary.average_productivity = values.iter().sum::<f64>() / values.len() as f64;
            summary.max_productivity = values.iter().copied().fold(f64::MIN, f64::max);
            summary.min_productivity = values.iter().copied().fold(f64::MAX, f64::min);
        }
        summary
    }
}

/// Weekly metrics recomputed from the stored records, plus maintenance.
pub struct MetricsService {
    store: Arc<SqliteStore>,
    aggregator: ProductivityAggregator,
}

impl MetricsService {
    pub fn new(store: Arc<SqliteStore>, aggregator: ProductivityAggregator) -> Self {
        Self { store, aggregator }
    }

    /// Weekly rows over every stored record, or one repository's.
    pub fn weekly_metrics_for(&self, repo: Option<&str>) -> Result<Vec<WeeklyMetric>, PulseError> {
        let records = self.store.list_records(repo)?;
        Ok(self.aggregator.weekly_metrics(&records))
    }

    /// Weekly rows paired with their trailing moving average.
    pub fn weekly_with_average(
        &self,
        repo: Option<&str>,
        window: usize,
    ) -> Result<Vec<(WeeklyMetric, f64)>, PulseError> {
        let weeks = self.weekly_metrics_for(repo)?;
        let averages = moving_average(&weeks, window)?;
        Ok(weeks.into_iter().zip(averages).collect())
    }

    pub fn metrics_summary(&self, repo: Option<&str>) -> Result<MetricsSummary, PulseError> {
        Ok(MetricsSummary::from_weeks(&self.weekly_metrics_for(repo)?))
    }

    pub fn repository_stats(&self) -> Result<Vec<RepoStats>, PulseError> {
        self.store.with_connection(ops::repository_stats)
    }

    /// Delete records merged before `before` and weekly rows starting
    /// before it.
    pub fn cleanup(&self, before: NaiveDate) -> Result<CleanupCounts, PulseError> {
        let counts = self
            .store
            .with_transaction(|conn| ops::delete_before(conn, before))?;
        tracing::info!(
            %before,
            deleted_prs = counts.deleted_prs,
            deleted_metrics = counts.deleted_metrics,
            "cleanup finished"
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use mergepulse_core::models::pull_request::PullRequestRecord;

    fn pr(repo: &str, number: u64, author: &str, merged_at: DateTime<Utc>) -> PullRequestRecord {
        PullRequestRecord {
            repo: repo.to_string(),
            number,
            author: author.to_string(),
            title: format!("PR {number}"),
            merged_at: Some(merged_at),
            created_at: merged_at,
            updated_at: merged_at,
        }
    }

    fn service() -> (Arc<SqliteStore>, MetricsService) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = MetricsService::new(store.clone(), ProductivityAggregator::default());
        (store, service)
    }

    fn seed(store: &SqliteStore) {
        let week1 = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let week2 = Utc.with_ymd_and_hms(2024, 1, 9, 10, 0, 0).unwrap();
        store
            .insert_records(&[
                pr("acme/a", 1, "ana", week1),
                pr("acme/a", 2, "bo", week1),
                pr("acme/a", 3, "ana", week1),
                pr("acme/a", 4, "ana", week2),
                pr("acme/b", 1, "cy", week2),
            ])
            .unwrap();
    }

    #[test]
    fn test_weekly_metrics_for_repo_and_all() {
        let (store, service) = service();
        seed(&store);

        let a = service.weekly_metrics_for(Some("acme/a")).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].repo, "acme/a");
        assert_eq!(a[0].productivity, Some(1.5));
        assert_eq!(a[1].pr_count, 1);

        let all = service.weekly_metrics_for(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].pr_count, 2);
        assert_eq!(all[1].unique_author_count, 2);
    }

    #[test]
    fn test_summary() {
        let (store, service) = service();
        assert_eq!(service.metrics_summary(None).unwrap(), MetricsSummary::default());

        seed(&store);
        let summary = service.metrics_summary(Some("acme/a")).unwrap();
        assert_eq!(summary.total_weeks, 2);
        assert_eq!(summary.total_prs, 4);
        assert_eq!(summary.max_productivity, 1.5);
        assert_eq!(summary.min_productivity, 1.0);
        assert_eq!(summary.average_productivity, 1.25);
    }

    #[test]
    fn test_weekly_with_average() {
        let (store, service) = service();
        seed(&store);
        let rows = service.weekly_with_average(Some("acme/a"), 2).unwrap();
        assert!(rows[0].1.is_nan());
        assert_eq!(rows[1].1, 1.25);
    }

    #[test]
    fn test_stats_and_cleanup() {
        let (store, service) = service();
        seed(&store);

        let stats = service.repository_stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].repo, "acme/a");
        assert_eq!(stats[0].pr_count, 4);
        assert_eq!(stats[0].unique_authors, 2);

        let counts = service
            .cleanup(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap())
            .unwrap();
        assert_eq!(counts.deleted_prs, 3);
        assert_eq!(store.list_records(None).unwrap().len(), 2);
    }
}
