//! Configuration types for the session scheduler.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{Result, SchedulerError};

pub use meridian_api::DEFAULT_OPEN_TIMEOUT as DEFAULT_SESSION_OPEN_TIMEOUT;

/// Default time a session may sit unassigned before it is aged out.
pub const DEFAULT_SESSION_PENDING_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sync loop configuration.
    pub sync: SyncConfig,
    /// Housekeeping sweep configuration.
    pub housekeeping: HousekeepingConfig,
}

impl SchedulerConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. `scheduler.toml` in the current directory (if present)
    /// 3. Environment variables with `MERIDIAN_SCHEDULER_` prefix
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Toml::file("scheduler.toml"))
            .merge(Env::prefixed("MERIDIAN_SCHEDULER_").split("__"))
            .extract()
            .map_err(|e| SchedulerError::Config(e.to_string()))
    }
}

/// Sync loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of concurrent sync workers. Each application key is
    /// processed by at most one worker at a time regardless.
    pub workers: usize,
    /// Ambient deadline applied to every external call.
    #[serde(with = "serde_duration_secs")]
    pub call_deadline: Duration,
    /// Delay before a failed application sync is retried.
    #[serde(with = "serde_duration_secs")]
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            call_deadline: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Housekeeping sweep configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    /// Interval between timeout sweeps. A fraction of
    /// [`DEFAULT_SESSION_PENDING_TIMEOUT`] so stale sessions are caught
    /// well within their pending window.
    #[serde(with = "serde_duration_secs")]
    pub interval: Duration,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
