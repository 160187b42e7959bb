//! Scheduler types.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cron;
use crate::error::{Result, SchedulerError};
use crate::handler::JobHandler;

/// Fixed delay before a failed job is retried.
pub const RETRY_BACKOFF_SECS: i64 = 300;

/// How often a job recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Run once, then mark completed.
    Once,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// Driven by a cron expression.
    Custom,
}

/// Current status of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to run.
    #[default]
    Pending,
    /// Job is currently executing.
    Running,
    /// One-shot job finished successfully.
    Completed,
    /// Retries exhausted; the job is disabled.
    Failed,
    /// Cancelled by a caller; the job is disabled.
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses are never re-initiated by the scheduler itself.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(SchedulerError::Validation(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

/// A scheduled job: the declarative, persistable part.
///
/// The handler is kept next to the job in the store and is never part of
/// this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Generated identifier, never reused.
    pub id: String,
    /// Human-readable name. Also the key handlers are rebound by after reload.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub frequency: Frequency,
    /// Required when `frequency` is [`Frequency::Custom`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// Earliest moment the job may run.
    pub next_run_time: DateTime<Utc>,
    /// When the most recent attempt finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Utc>>,
    pub status: JobStatus,
    /// Retries used since the last success.
    pub retry_count: u32,
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    pub enabled: bool,
    /// Caller-supplied data, never interpreted. An explicit `null` is kept
    /// as `Some(Value::Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub metadata: Option<serde_json::Value>,
}

/// Deserialize a field that is present in the input, `null` included.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Job {
    /// Check if this job is eligible to run at `now`.
    ///
    /// Whether the job is already executing is tracked by the scheduler.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.status.is_terminal() && self.next_run_time <= now
    }

    /// Calculate the next run time after a successful execution at `from`.
    pub fn calculate_next_run(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(expression) = &self.cron_expression {
            match cron::next_run_time(expression, from) {
                Ok(next) => return next,
                Err(e) => {
                    warn!(job_id = %self.id, error = %e, "invalid cron expression, falling back to one hour");
                    return from + Duration::hours(1);
                }
            }
        }

        match self.frequency {
            Frequency::Hourly => from + Duration::hours(1),
            Frequency::Daily => from + Duration::hours(24),
            Frequency::Weekly => from + Duration::days(7),
            // Clamps to the last day of shorter months (Jan 31 -> Feb 28/29).
            Frequency::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or_else(|| from + Duration::days(30)),
            Frequency::Once | Frequency::Custom => from + Duration::hours(1),
        }
    }

    /// Delay before retrying after a failure. Fixed, not exponential.
    pub fn retry_delay(&self) -> Duration {
        Duration::seconds(RETRY_BACKOFF_SECS)
    }

    /// Whether another attempt is allowed after a failure.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Registration input for [`crate::Scheduler::schedule_job`].
#[derive(Clone)]
pub struct JobSpec {
    pub name: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub cron_expression: Option<String>,
    pub next_run_time: DateTime<Utc>,
    /// Falls back to the scheduler's configured default.
    pub max_retries: Option<u32>,
    pub enabled: bool,
    pub metadata: Option<serde_json::Value>,
    pub handler: JobHandler,
}

impl JobSpec {
    /// Create an enabled job spec.
    pub fn new(
        name: impl Into<String>,
        frequency: Frequency,
        next_run_time: DateTime<Utc>,
        handler: JobHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            frequency,
            cron_expression: None,
            next_run_time,
            max_retries: None,
            enabled: true,
            metadata: None,
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the frequency/expression pairing.
    pub fn validate(&self) -> Result<()> {
        match &self.cron_expression {
            None if self.frequency == Frequency::Custom => Err(SchedulerError::Validation(
                format!("job '{}' has custom frequency but no cron expression", self.name),
            )),
            Some(expression) if !cron::validate(expression) => {
                Err(SchedulerError::Validation(format!(
                    "job '{}' has invalid cron expression '{}'",
                    self.name, expression
                )))
            }
            _ => Ok(()),
        }
    }

    /// Split into the persistable job and its handler.
    pub(crate) fn into_job(self, id: String, default_max_retries: u32) -> (Job, JobHandler) {
        let job = Job {
            id,
            name: self.name,
            description: self.description,
            frequency: self.frequency,
            cron_expression: self.cron_expression,
            next_run_time: self.next_run_time,
            last_run_time: None,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            enabled: self.enabled,
            metadata: self.metadata,
        };
        (job, self.handler)
    }
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("frequency", &self.frequency)
            .field("cron_expression", &self.cron_expression)
            .field("next_run_time", &self.next_run_time)
            .field("max_retries", &self.max_retries)
            .field("enabled", &self.enabled)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Outcome of one execution attempt. Emitted with events, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    /// `Completed` or `Failed` for this attempt.
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: std::time::Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Job counts per status plus the ids currently executing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub running_job_ids: Vec<String>,
}

impl SchedulerStats {
    /// Count jobs by status.
    pub fn from_jobs<'a>(
        jobs: impl IntoIterator<Item = &'a Job>,
        running_job_ids: Vec<String>,
    ) -> Self {
        let mut stats = SchedulerStats {
            running_job_ids,
            ..Default::default()
        };
        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn noop() -> JobHandler {
        handler_fn(|| async { Ok(()) })
    }

    fn job(frequency: Frequency) -> Job {
        let (job, _) = JobSpec::new("test", frequency, Utc::now(), noop()).into_job("job-1".into(), 3);
        job
    }

    // === Unit Tests ===

    #[test]
    fn test_into_job_defaults() {
        let (job, _) = JobSpec::new("Test", Frequency::Daily, Utc::now(), noop())
            .with_description("desc")
            .into_job("job-1".to_string(), 3);

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert!(job.enabled);
        assert!(job.last_run_time.is_none());
        assert_eq!(job.description.as_deref(), Some("desc"));
    }

    #[test]
    fn test_explicit_max_retries_wins() {
        let (job, _) = JobSpec::new("Test", Frequency::Daily, Utc::now(), noop())
            .with_max_retries(0)
            .into_job("job-1".to_string(), 3);
        assert_eq!(job.max_retries, 0);
    }

    #[test]
    fn test_validate_custom_requires_expression() {
        let spec = JobSpec::new("Test", Frequency::Custom, Utc::now(), noop());
        assert!(matches!(spec.validate(), Err(SchedulerError::Validation(_))));

        let spec = spec.with_cron("30 * * * *");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_expression() {
        let spec = JobSpec::new("Test", Frequency::Hourly, Utc::now(), noop()).with_cron("0 *");
        assert!(matches!(spec.validate(), Err(SchedulerError::Validation(_))));
    }

    #[test]
    fn test_validate_allows_expression_on_fixed_frequency() {
        let spec = JobSpec::new("Test", Frequency::Hourly, Utc::now(), noop()).with_cron("0 * * * *");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_job_is_due() {
        let now = Utc::now();
        let mut job = job(Frequency::Daily);
        job.next_run_time = now - Duration::seconds(1);
        assert!(job.is_due(now));

        job.enabled = false;
        assert!(!job.is_due(now));
        job.enabled = true;

        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            job.status = status;
            assert!(!job.is_due(now), "{} job should not be due", status);
        }
    }

    #[test]
    fn test_frequency_table() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 8, 15, 30).unwrap();
        assert_eq!(job(Frequency::Hourly).calculate_next_run(from), from + Duration::hours(1));
        assert_eq!(job(Frequency::Daily).calculate_next_run(from), from + Duration::hours(24));
        assert_eq!(job(Frequency::Weekly).calculate_next_run(from), from + Duration::days(7));
        assert_eq!(
            job(Frequency::Monthly).calculate_next_run(from),
            Utc.with_ymd_and_hms(2026, 4, 10, 8, 15, 30).unwrap()
        );
        assert_eq!(job(Frequency::Once).calculate_next_run(from), from + Duration::hours(1));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let from = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(
            job(Frequency::Monthly).calculate_next_run(from),
            Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap()
        );

        let leap = Utc.with_ymd_and_hms(2028, 1, 30, 12, 0, 0).unwrap();
        assert_eq!(
            job(Frequency::Monthly).calculate_next_run(leap),
            Utc.with_ymd_and_hms(2028, 2, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_cron_expression_overrides_frequency() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 8, 15, 30).unwrap();
        let mut job = job(Frequency::Hourly);
        job.cron_expression = Some("30 * * * *".to_string());
        assert_eq!(
            job.calculate_next_run(from),
            Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_stored_expression_falls_back() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 8, 15, 30).unwrap();
        let mut job = job(Frequency::Custom);
        job.cron_expression = Some("broken".to_string());
        assert_eq!(job.calculate_next_run(from), from + Duration::hours(1));
    }

    #[test]
    fn test_retry_delay_is_fixed() {
        let mut job = job(Frequency::Daily);
        assert_eq!(job.retry_delay().num_seconds(), 300);
        job.retry_count = 7;
        assert_eq!(job.retry_delay().num_seconds(), 300);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_serializes_with_camel_case_fields() {
        let mut job = job(Frequency::Custom);
        job.cron_expression = Some("0 0 * * *".to_string());
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["frequency"], "custom");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["cronExpression"], "0 0 * * *");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["maxRetries"], 3);
        assert!(json.get("nextRunTime").is_some());
        assert!(json.get("lastRunTime").is_none());
        assert!(json.get("handler").is_none());
    }

    #[test]
    fn test_stats_from_jobs() {
        let mut a = job(Frequency::Daily);
        let mut b = job(Frequency::Daily);
        let c = job(Frequency::Daily);
        a.status = JobStatus::Failed;
        b.status = JobStatus::Running;

        let stats = SchedulerStats::from_jobs([&a, &b, &c], vec!["job-1".to_string()]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.running_job_ids, vec!["job-1".to_string()]);
    }

    // === Property-Based Tests ===

    proptest! {
        // Recurring frequencies always move strictly forward
        #[test]
        fn next_run_moves_forward(
            secs in 0i64..4_000_000_000,
            freq in prop_oneof![
                Just(Frequency::Hourly),
                Just(Frequency::Daily),
                Just(Frequency::Weekly),
                Just(Frequency::Monthly),
            ],
        ) {
            let from = Utc.timestamp_opt(secs, 0).unwrap();
            let next = job(freq).calculate_next_run(from);
            prop_assert!(next > from);
        }

        // Terminal jobs are never due regardless of next_run_time
        #[test]
        fn terminal_job_never_due(
            offset in -1000i64..1000,
            status in prop_oneof![
                Just(JobStatus::Completed),
                Just(JobStatus::Failed),
                Just(JobStatus::Cancelled),
            ],
        ) {
            let now = Utc::now();
            let mut job = job(Frequency::Daily);
            job.status = status;
            job.next_run_time = now + Duration::seconds(offset);
            prop_assert!(!job.is_due(now));
        }
    }
}
