//! Read-only commands: job listing and cron preview.

use std::path::Path;

use chrono::{DateTime, Utc};
use miette::Result;

use cadence_scheduler::{CronShape, Job, JobPersistence, JobStatus, cron};

/// Print persisted jobs, optionally filtered by status.
pub async fn list_jobs(path: &Path, status: Option<JobStatus>, json: bool) -> Result<()> {
    let jobs: Vec<Job> = JobPersistence::new(path)
        .load()
        .await
        .into_iter()
        .filter(|job| status.is_none_or(|s| job.status == s))
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&jobs)
            .map_err(|e| miette::miette!("failed to encode jobs: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs in {}", path.display());
        return Ok(());
    }

    for job in &jobs {
        println!("{}", format_job_line(job));
    }
    Ok(())
}

/// Validate `expression` and print its next `count` due times.
pub fn preview_cron(expression: &str, from: Option<&str>, count: usize) -> Result<()> {
    let shape = CronShape::parse(expression).map_err(|e| miette::miette!("{}", e))?;

    let mut at = match from {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| miette::miette!("invalid --from time '{}': {}", raw, e))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    println!("{}", cron::describe(expression));
    if !shape.is_supported() {
        println!("(unsupported shape: falls back to hourly from the previous run)");
    }

    for _ in 0..count {
        at = shape.next_after(at);
        println!("  {}", at.to_rfc3339());
    }
    Ok(())
}

fn format_job_line(job: &Job) -> String {
    let schedule = match &job.cron_expression {
        Some(expr) => cron::describe(expr),
        None => format!("{:?}", job.frequency).to_lowercase(),
    };
    let mut line = format!(
        "{}  {:<24} {:<10} next={} retries={}/{} [{}]",
        job.id,
        job.name,
        job.status.as_str(),
        job.next_run_time.to_rfc3339(),
        job.retry_count,
        job.max_retries,
        schedule,
    );
    if !job.enabled {
        line.push_str(" (disabled)");
    }
    line
}
