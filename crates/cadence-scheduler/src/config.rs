//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default interval between ticks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default retries allowed after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default location of the persistence file.
pub const DEFAULT_PERSISTENCE_PATH: &str = "./scheduler-jobs.json";

/// Static configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Write job metadata to `persistence_path` on every change.
    pub persist_jobs: bool,
    pub persistence_path: PathBuf,
    /// How often the scheduler checks for due jobs.
    pub check_interval: Duration,
    /// Used when a job spec does not set `max_retries`.
    pub default_max_retries: u32,
    /// Treat executions running longer than this as failures.
    /// `None` means handlers may run indefinitely.
    pub execution_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            persist_jobs: false,
            persistence_path: PathBuf::from(DEFAULT_PERSISTENCE_PATH),
            check_interval: DEFAULT_CHECK_INTERVAL,
            default_max_retries: DEFAULT_MAX_RETRIES,
            execution_timeout: None,
        }
    }
}

impl SchedulerConfig {
    /// Enable persistence at `path`.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_jobs = true;
        self.persistence_path = path.into();
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}
