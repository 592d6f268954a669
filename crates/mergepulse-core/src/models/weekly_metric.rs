use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Label used for weekly rows aggregated across several repositories.
pub const ALL_REPOSITORIES: &str = "*";

/// Per-week productivity for one repository.
///
/// Identity is `(repo, week_start_date)`. Rows are derived data: they can
/// always be recomputed from stored pull requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMetric {
    pub repo: String,
    /// Local Monday of the week.
    pub week_start_date: NaiveDate,
    pub pr_count: u32,
    pub unique_author_count: u32,
    /// `None` only for rows loaded from a store that never recorded it.
    pub productivity: Option<f64>,
}

impl WeeklyMetric {
    /// Local Sunday of the week.
    pub fn week_end_date(&self) -> NaiveDate {
        self.week_start_date + Duration::days(6)
    }

    /// `2024-01-01 - 2024-01-07`
    pub fn week_range(&self) -> String {
        format!("{} - {}", self.week_start_date, self.week_end_date())
    }
}

/// `pr_count / unique_author_count`, or `0.0` when there are no authors.
pub fn productivity(pr_count: u32, unique_author_count: u32) -> f64 {
    if unique_author_count == 0 {
        return 0.0;
    }
    f64::from(pr_count) / f64::from(unique_author_count)
}
