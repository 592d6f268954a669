//! Weekly bucketing of merged pull requests.
//!
//! Weeks run from local Monday 00:00 to Sunday 23:59:59.999999 in the
//! display timezone.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use mergepulse_core::error::PulseError;
use mergepulse_core::models::pull_request::PullRequestRecord;
use mergepulse_core::models::weekly_metric::{productivity, WeeklyMetric, ALL_REPOSITORIES};

#[derive(Debug, Clone, Copy)]
pub struct ProductivityAggregator {
    tz: Tz,
}

impl Default for ProductivityAggregator {
    fn default() -> Self {
        Self { tz: Tz::UTC }
    }
}

impl ProductivityAggregator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Local Monday of the week containing `t`.
    pub fn week_start_date(&self, t: DateTime<Utc>) -> NaiveDate {
        monday_of(t.with_timezone(&self.tz).date_naive())
    }

    /// Same as [`week_start_date`](Self::week_start_date) for a timestamp
    /// already expressed in the display timezone.
    pub fn week_start_date_local(&self, t: NaiveDateTime) -> NaiveDate {
        monday_of(t.date())
    }

    /// First and last instant of the week containing `t`.
    pub fn week_boundaries(&self, t: DateTime<Utc>) -> (DateTime<Tz>, DateTime<Tz>) {
        let start_date = self.week_start_date(t);
        let start = self.local_midnight(start_date);
        let end = self.local_midnight(start_date + Duration::days(7)) - Duration::microseconds(1);
        (start, end)
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Tz> {
        let naive = date.and_time(chrono::NaiveTime::MIN);
        // Zones that skip midnight for DST fall back to the UTC reading.
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| self.tz.from_utc_datetime(&naive))
    }

    /// One row per week with at least one merged pull request, ascending by
    /// week start. Unmerged records are ignored.
    ///
    /// Rows carry the records' repository when they all share one, and
    /// [`ALL_REPOSITORIES`] otherwise.
    pub fn weekly_metrics(&self, records: &[PullRequestRecord]) -> Vec<WeeklyMetric> {
        let mut weeks: BTreeMap<NaiveDate, (u32, HashSet<&str>)> = BTreeMap::new();
        let mut repos: HashSet<&str> = HashSet::new();

        for record in records {
            let Some(merged_at) = record.merged_at else {
                continue;
            };
            let entry = weeks.entry(self.week_start_date(merged_at)).or_default();
            entry.0 += 1;
            entry.1.insert(record.author.as_str());
            repos.insert(record.repo.as_str());
        }

        let label = match repos.len() {
            1 => repos.into_iter().next().unwrap_or(ALL_REPOSITORIES),
            _ => ALL_REPOSITORIES,
        };

        weeks
            .into_iter()
            .map(|(week_start_date, (pr_count, authors))| {
                let unique_author_count = authors.len() as u32;
                WeeklyMetric {
                    repo: label.to_string(),
                    week_start_date,
                    pr_count,
                    unique_author_count,
                    productivity: Some(productivity(pr_count, unique_author_count)),
                }
            })
            .collect()
    }
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Trailing mean of `productivity` over `window` rows, aligned by position.
///
/// The first `window - 1` positions are `NaN`. Rows are not re-aligned to
/// calendar weeks, so a gap week simply is not counted.
pub fn moving_average(metrics: &[WeeklyMetric], window: usize) -> Result<Vec<f64>, PulseError> {
    if window == 0 {
        return Err(PulseError::Config {
            message: "moving average window must be at least 1".into(),
        });
    }
    let values = metrics
        .iter()
        .map(|m| {
            m.productivity.ok_or_else(|| PulseError::MissingField {
                field: format!("productivity ({} week of {})", m.repo, m.week_start_date),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    Ok((0..values.len())
        .map(|i| {
            if i + 1 < window {
                f64::NAN
            } else {
                let slice = &values[i + 1 - window..=i];
                slice.iter().sum::<f64>() / window as f64
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(repo: &str, number: u64, author: &str, merged_at: DateTime<Utc>) -> PullRequestRecord {
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

    fn metric(week: NaiveDate, productivity: Option<f64>) -> WeeklyMetric {
        WeeklyMetric {
            repo: "acme/widgets".into(),
            week_start_date: week,
            pr_count: 1,
            unique_author_count: 1,
            productivity,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sunday_night_and_monday_morning_split() {
        let agg = ProductivityAggregator::default();
        // 2024-03-10 is a Sunday.
        let sunday = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 0, 1, 0).unwrap();
        assert_eq!(agg.week_start_date(sunday), date(2024, 3, 4));
        assert_eq!(agg.week_start_date(monday), date(2024, 3, 11));

        let rows = agg.weekly_metrics(&[
            merged("acme/widgets", 1, "ana", sunday),
            merged("acme/widgets", 2, "ana", monday),
        ]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_week_boundaries_span_monday_to_sunday() {
        let agg = ProductivityAggregator::default();
        let t = Utc.with_ymd_and_hms(2024, 3, 13, 15, 30, 0).unwrap();
        let (start, end) = agg.week_boundaries(t);
        assert_eq!(start.naive_local(), date(2024, 3, 11).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(
            end.naive_local(),
            date(2024, 3, 17).and_hms_micro_opt(23, 59, 59, 999_999).unwrap()
        );
    }

    #[test]
    fn test_display_timezone_shifts_bucket() {
        let agg = ProductivityAggregator::new(chrono_tz::Asia::Tokyo);
        // Sunday 20:00 UTC is already Monday 05:00 in Tokyo.
        let t = Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap();
        assert_eq!(agg.week_start_date(t), date(2024, 3, 11));
        assert_eq!(ProductivityAggregator::default().week_start_date(t), date(2024, 3, 4));
    }

    #[test]
    fn test_naive_timestamp_is_local() {
        let agg = ProductivityAggregator::new(chrono_tz::America::New_York);
        let local = date(2024, 3, 17).and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(agg.week_start_date_local(local), date(2024, 3, 11));
    }

    #[test]
    fn test_productivity_per_week() {
        let agg = ProductivityAggregator::default();
        let t = Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap();
        let rows = agg.weekly_metrics(&[
            merged("acme/widgets", 1, "ana", t),
            merged("acme/widgets", 2, "bo", t + Duration::hours(2)),
            merged("acme/widgets", 3, "ana", t + Duration::days(1)),
        ]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].repo, "acme/widgets");
        assert_eq!(rows[0].pr_count, 3);
        assert_eq!(rows[0].unique_author_count, 2);
        assert_eq!(rows[0].productivity, Some(1.5));
    }

    #[test]
    fn test_sorted_ascending_and_empty_input() {
        let agg = ProductivityAggregator::default();
        assert!(agg.weekly_metrics(&[]).is_empty());

        let late = Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let rows = agg.weekly_metrics(&[
            merged("acme/widgets", 9, "ana", late),
            merged("acme/gears", 1, "bo", early),
        ]);
        let starts: Vec<NaiveDate> = rows.iter().map(|r| r.week_start_date).collect();
        assert_eq!(starts, vec![date(2024, 1, 1), date(2024, 4, 1)]);
        assert!(rows.iter().all(|r| r.repo == ALL_REPOSITORIES));
    }

    #[test]
    fn test_unmerged_records_are_ignored() {
        let agg = ProductivityAggregator::default();
        let t = Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap();
        let mut open = merged("acme/widgets", 2, "bo", t);
        open.merged_at = None;
        let rows = agg.weekly_metrics(&[merged("acme/widgets", 1, "ana", t), open]);
        assert_eq!(rows[0].pr_count, 1);
    }

    #[test]
    fn test_moving_average_window_four() {
        let weeks: Vec<WeeklyMetric> = [2.0, 2.5, 3.0, 2.25]
            .iter()
            .enumerate()
            .map(|(i, p)| metric(date(2024, 1, 1) + Duration::weeks(i as i64), Some(*p)))
            .collect();
        let avg = moving_average(&weeks, 4).unwrap();
        assert_eq!(avg.len(), 4);
        assert!(avg[..3].iter().all(|v| v.is_nan()));
        assert_eq!(avg[3], 2.4375);
    }

    #[test]
    fn test_moving_average_edges() {
        assert!(moving_average(&[], 4).unwrap().is_empty());

        let short = vec![metric(date(2024, 1, 1), Some(1.0))];
        assert!(moving_average(&short, 4).unwrap()[0].is_nan());
        assert_eq!(moving_average(&short, 1).unwrap(), vec![1.0]);

        let missing = vec![metric(date(2024, 1, 1), None)];
        assert!(matches!(
            moving_average(&missing, 4),
            Err(PulseError::MissingField { .. })
        ));
    }
}
