use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PulseError;

/// Top-level configuration, stored at `~/.mergepulse/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Tracked repositories in `owner/name` form.
    #[serde(default)]
    pub repositories: Vec<String>,

    /// IANA timezone used for week bucketing.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Lookback window for the initial sync.
    #[serde(default = "default_days_back")]
    pub days_back: u32,

    /// Worker pool size for parallel sync.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_api_url")]
    pub api_url: url::Url,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Timeout applied to every remote call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause pre-emptively once remaining quota drops below this.
    #[serde(default = "default_quota_buffer")]
    pub quota_buffer: u32,

    /// Extra wait added after a quota reset time.
    #[serde(default = "default_quota_safety_margin_secs")]
    pub quota_safety_margin_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_factor_secs")]
    pub backoff_factor_secs: f64,

    #[serde(default = "default_moving_average_window")]
    pub moving_average_window: usize,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_days_back() -> u32 {
    180
}

fn default_max_workers() -> usize {
    8
}

fn default_api_url() -> url::Url {
    url::Url::parse("https://api.github.com").expect("static url")
}

fn default_per_page() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_quota_buffer() -> u32 {
    100
}

fn default_quota_safety_margin_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_factor_secs() -> f64 {
    1.0
}

fn default_moving_average_window() -> usize {
    4
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            timezone: default_timezone(),
            days_back: default_days_back(),
            max_workers: default_max_workers(),
            api_url: default_api_url(),
            per_page: default_per_page(),
            request_timeout_secs: default_request_timeout_secs(),
            quota_buffer: default_quota_buffer(),
            quota_safety_margin_secs: default_quota_safety_margin_secs(),
            max_attempts: default_max_attempts(),
            backoff_factor_secs: default_backoff_factor_secs(),
            moving_average_window: default_moving_average_window(),
        }
    }
}

impl PulseConfig {
    /// Returns the mergepulse home directory (`~/.mergepulse/`).
    pub fn home_dir() -> Result<PathBuf, PulseError> {
        let base = dirs::home_dir().ok_or_else(|| PulseError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".mergepulse"))
    }

    pub fn config_path() -> Result<PathBuf, PulseError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    pub fn db_path() -> Result<PathBuf, PulseError> {
        Ok(Self::home_dir()?.join("mergepulse.db"))
    }

    /// Load config from the default location, or return defaults if not found.
    pub fn load() -> Result<Self, PulseError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, PulseError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PulseError::Serialization(e.to_string()))
    }

    pub fn save(&self) -> Result<(), PulseError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PulseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PulseError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create the home directory and a default config if none exists.
    pub fn init() -> Result<PathBuf, PulseError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(&home)?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }

    /// Check the values the sync engine relies on.
    pub fn validate(&self) -> Result<(), PulseError> {
        for repo in &self.repositories {
            let mut parts = repo.splitn(2, '/');
            let owner = parts.next().unwrap_or_default();
            let name = parts.next().unwrap_or_default();
            if owner.is_empty() || name.is_empty() || name.contains('/') {
                return Err(PulseError::Config {
                    message: format!("repository must be owner/name: {repo}"),
                });
            }
        }
        self.display_timezone()?;
        if self.max_workers == 0 {
            return Err(PulseError::Config {
                message: "max_workers must be at least 1".into(),
            });
        }
        if self.max_attempts == 0 {
            return Err(PulseError::Config {
                message: "max_attempts must be at least 1".into(),
            });
        }
        if self.per_page == 0 || self.per_page > 100 {
            return Err(PulseError::Config {
                message: format!("per_page must be within 1..=100, got {}", self.per_page),
            });
        }
        if self.moving_average_window == 0 {
            return Err(PulseError::Config {
                message: "moving_average_window must be at least 1".into(),
            });
        }
        if !(self.backoff_factor_secs >= 0.0) {
            return Err(PulseError::Config {
                message: "backoff_factor_secs must be non-negative".into(),
            });
        }
        Ok(())
    }

    pub fn display_timezone(&self) -> Result<chrono_tz::Tz, PulseError> {
        self.timezone.parse().map_err(|_| PulseError::Config {
            message: format!("unknown timezone: {}", self.timezone),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn quota_safety_margin(&self) -> Duration {
        Duration::from_secs(self.quota_safety_margin_secs)
    }

    pub fn backoff_factor(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_factor_secs.max(0.0))
    }
}
