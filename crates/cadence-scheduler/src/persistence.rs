//! JSON file persistence for job metadata.
//!
//! The file holds a JSON array of [`Job`] records. Handlers never appear in
//! it. Every write replaces the whole file via a temp file and rename, so a
//! crash leaves either the previous or the new contents.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::types::Job;

/// Reads and writes the job persistence file.
#[derive(Debug, Clone)]
pub struct JobPersistence {
    path: PathBuf,
}

impl JobPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `jobs`.
    pub async fn persist(&self, jobs: &[Job]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(count = jobs.len(), path = %self.path.display(), "persisted jobs");
        Ok(())
    }

    /// Load jobs from the file.
    ///
    /// A missing, unreadable or malformed file yields no jobs.
    pub async fn load(&self) -> Vec<Job> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted jobs");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read persisted jobs");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Job>>(&data) {
            Ok(jobs) => {
                debug!(count = jobs.len(), path = %self.path.display(), "loaded persisted jobs");
                jobs
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to parse persisted jobs");
                Vec::new()
            }
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::types::{Frequency, JobSpec, JobStatus};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn sample_jobs() -> Vec<Job> {
        let noop = handler_fn(|| async { Ok(()) });
        let (mut a, _) = JobSpec::new("archive", Frequency::Daily, Utc::now(), noop.clone())
            .with_description("Archive old notes")
            .with_metadata(json!({"folder": "inbox", "days": 30}))
            .into_job("job-a".to_string(), 3);
        a.retry_count = 2;
        a.status = JobStatus::Pending;
        a.last_run_time = Some(Utc.with_ymd_and_hms(2026, 5, 1, 3, 4, 5).unwrap());
        a.next_run_time = Utc::now() + Duration::nanoseconds(123_456_789);

        let (mut b, _) = JobSpec::new("digest", Frequency::Custom, Utc::now(), noop)
            .with_cron("30 7 * * *")
            .into_job("job-b".to_string(), 1);
        b.status = JobStatus::Failed;
        b.enabled = false;

        vec![a, b]
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JobPersistence::new(dir.path().join("jobs.json"));
        let jobs = sample_jobs();

        persistence.persist(&jobs).await.unwrap();
        let loaded = persistence.load().await;

        assert_eq!(loaded, jobs);
    }

    #[tokio::test]
    async fn test_persist_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("jobs.json");
        let persistence = JobPersistence::new(&path);

        persistence.persist(&sample_jobs()).await.unwrap();
        assert!(path.exists());
        assert!(!persistence.temp_path().exists());
    }

    #[tokio::test]
    async fn test_persist_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JobPersistence::new(dir.path().join("jobs.json"));

        persistence.persist(&sample_jobs()).await.unwrap();
        persistence.persist(&sample_jobs()[..1]).await.unwrap();

        let loaded = persistence.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "job-a");
    }

    #[tokio::test]
    async fn test_file_format_omits_handler() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JobPersistence::new(dir.path().join("jobs.json"));
        persistence.persist(&sample_jobs()).await.unwrap();

        let raw = std::fs::read_to_string(persistence.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let records = value.as_array().unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.get("handler").is_none()));
        assert_eq!(records[1]["cronExpression"], "30 7 * * *");
        assert_eq!(records[1]["status"], "failed");
        assert_eq!(records[0]["metadata"]["folder"], "inbox");
    }

    #[tokio::test]
    async fn test_null_metadata_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JobPersistence::new(dir.path().join("jobs.json"));

        let mut jobs = sample_jobs();
        jobs[1].metadata = Some(serde_json::Value::Null);
        persistence.persist(&jobs).await.unwrap();

        let raw = std::fs::read_to_string(persistence.path()).unwrap();
        assert!(raw.contains("\"metadata\": null"));

        let loaded = persistence.load().await;
        assert_eq!(loaded, jobs);
        assert_eq!(loaded[1].metadata, Some(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JobPersistence::new(dir.path().join("absent.json"));
        assert!(persistence.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let persistence = JobPersistence::new(&path);
        assert!(persistence.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_hand_written_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"[{
                "id": "job-1",
                "name": "sweep",
                "frequency": "weekly",
                "nextRunTime": "2026-06-01T09:00:00Z",
                "status": "pending",
                "retryCount": 0,
                "maxRetries": 3,
                "enabled": true
            }]"#,
        )
        .unwrap();

        let loaded = JobPersistence::new(&path).load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].frequency, Frequency::Weekly);
        assert_eq!(
            loaded[0].next_run_time,
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
        );
        assert!(loaded[0].description.is_none());
        assert!(loaded[0].metadata.is_none());
    }
}
