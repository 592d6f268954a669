use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Per-repository sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl SyncStatus {
    /// Legal moves of the per-repository state machine.
    ///
    /// `pending`, `completed` and `error` may all enter `in_progress`; a
    /// running sync may only end in `completed` or `error`.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Completed, InProgress)
                | (Error, InProgress)
                | (InProgress, Completed)
                | (InProgress, Error)
        )
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::InProgress => write!(f, "in_progress"),
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "error" => Ok(SyncStatus::Error),
            _ => Err(format!("unknown sync status: {s}")),
        }
    }
}

/// One row per tracked repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub repo: String,
    pub status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_pr_number: Option<u64>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            status: SyncStatus::Pending,
            last_synced_at: None,
            last_pr_number: None,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    fn transition(&mut self, next: SyncStatus) -> Result<(), PulseError> {
        if !self.status.can_transition_to(next) {
            return Err(PulseError::InvalidTransition {
                repo: self.repo.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn begin(&mut self) -> Result<(), PulseError> {
        self.transition(SyncStatus::InProgress)
    }

    /// Finish successfully. `last_pr_number` is only replaced when the run
    /// actually saw pull requests.
    pub fn mark_completed(
        &mut self,
        synced_at: DateTime<Utc>,
        last_pr_number: Option<u64>,
    ) -> Result<(), PulseError> {
        self.transition(SyncStatus::Completed)?;
        self.last_synced_at = Some(synced_at);
        if last_pr_number.is_some() {
            self.last_pr_number = last_pr_number;
        }
        self.error_message = None;
        Ok(())
    }

    /// Finish with a failure. `last_synced_at` keeps its previous value.
    pub fn mark_error(&mut self, message: impl Into<String>) -> Result<(), PulseError> {
        self.transition(SyncStatus::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Lower bound for an incremental sync, if one is permitted.
    pub fn incremental_since(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SyncStatus::Completed => self.last_synced_at,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::InProgress,
            SyncStatus::Completed,
            SyncStatus::Error,
        ] {
            let parsed: SyncStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_legal_transitions() {
        use SyncStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(InProgress));
        assert!(Error.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Error));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Error));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn test_complete_cycle_clears_error() {
        let mut state = SyncState::new("acme/widgets");
        state.begin().unwrap();
        state.mark_error("boom").unwrap();
        assert_eq!(state.error_message.as_deref(), Some("boom"));
        assert!(state.incremental_since().is_none());

        let now = Utc::now();
        state.begin().unwrap();
        state.mark_completed(now, Some(17)).unwrap();
        assert_eq!(state.status, SyncStatus::Completed);
        assert_eq!(state.error_message, None);
        assert_eq!(state.last_pr_number, Some(17));
        assert_eq!(state.incremental_since(), Some(now));

        state.begin().unwrap();
        state.mark_completed(now, None).unwrap();
        assert_eq!(state.last_pr_number, Some(17));
    }

    #[test]
    fn test_completed_without_begin_is_rejected() {
        let mut state = SyncState::new("acme/widgets");
        let err = state.mark_completed(Utc::now(), None).unwrap_err();
        assert!(matches!(err, PulseError::InvalidTransition { .. }));
    }
}
