use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A merged pull request as harvested from the remote API.
///
/// Identity is `(repo, number)`. Once `merged_at` is set the record is
/// treated as final: later edits to title or author are never re-synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// Repository in `owner/name` form.
    pub repo: String,
    pub number: u64,
    pub author: String,
    pub title: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PullRequestRecord {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }

    /// `owner/name#123`
    pub fn identifier(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }
}
