use chrono::{DateTime, Utc};

/// Central error type for mergepulse.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("repository not found or not accessible: {repo}")]
    RepoNotFound { repo: String },

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("rate limit exceeded, resets at {reset_at}, {remaining} remaining")]
    QuotaExceeded {
        reset_at: DateTime<Utc>,
        remaining: u32,
    },

    #[error("transient API failure: {message}")]
    Transient { message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("repository {repo} has not been initially synced")]
    NotInitiallySynced { repo: String },

    #[error("missing field: {field}")]
    MissingField { field: String },

    #[error("invalid sync transition for {repo}: {from} -> {to}")]
    InvalidTransition {
        repo: String,
        from: String,
        to: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("credential error: {message}")]
    Credential { message: String },
}

impl PulseError {
    /// Errors the fetcher may retry: quota rejections and transient failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PulseError::QuotaExceeded { .. } | PulseError::Transient { .. }
        )
    }

    /// Storage failures abort a whole batch instead of a single repository.
    pub fn is_storage(&self) -> bool {
        matches!(self, PulseError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let quota = PulseError::QuotaExceeded {
            reset_at: Utc::now(),
            remaining: 0,
        };
        assert!(quota.is_retryable());
        assert!(PulseError::Transient {
            message: "502".into()
        }
        .is_retryable());
        assert!(!PulseError::RepoNotFound {
            repo: "a/b".into()
        }
        .is_retryable());
        assert!(!PulseError::AuthFailed {
            message: "bad token".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_storage_classification() {
        assert!(PulseError::Storage("disk full".into()).is_storage());
        assert!(!PulseError::Cancelled.is_storage());
    }
}
