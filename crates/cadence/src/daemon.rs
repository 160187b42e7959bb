//! Scheduler daemon.
//!
//! Reloads persisted jobs, logs every lifecycle event, and ticks until
//! Ctrl-C. Reloaded jobs keep their schedule but run stub handlers, since
//! payloads are owned by the subsystems that registered them.

use std::time::Duration;

use miette::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use cadence_scheduler::{Scheduler, SchedulerConfig, SchedulerEvent};

/// How long in-flight executions may keep running after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Run the scheduler until interrupted.
pub async fn run(config: SchedulerConfig) -> Result<()> {
    let scheduler = Scheduler::new(config);

    let loaded = scheduler.initialize().await;
    info!(
        loaded,
        path = %scheduler.config().persistence_path.display(),
        "scheduler initialized"
    );

    let mut events = scheduler.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    scheduler.start().await;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("failed to listen for shutdown signal: {}", e))?;
    info!("shutdown requested");

    scheduler.stop().await;
    let in_flight = scheduler.statistics().await.running_job_ids;
    if !in_flight.is_empty() {
        info!(running = ?in_flight, "waiting for in-flight jobs to finish");
        if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.wait_idle())
            .await
            .is_err()
        {
            warn!(grace = ?SHUTDOWN_GRACE, "in-flight jobs did not finish before shutdown");
        }
    }
    let stats = scheduler.statistics().await;

    scheduler
        .flush()
        .await
        .map_err(|e| miette::miette!("failed to persist jobs: {}", e))?;
    event_logger.abort();

    info!(
        total = stats.total,
        pending = stats.pending,
        completed = stats.completed,
        failed = stats.failed,
        cancelled = stats.cancelled,
        "scheduler shut down gracefully"
    );
    Ok(())
}

fn log_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Scheduled(job) | SchedulerEvent::Cancelled(job) => {
            info!(event = event.name(), job_id = %job.id, name = %job.name, "job event");
        }
        SchedulerEvent::Started(job) => {
            info!(event = event.name(), job_id = %job.id, name = %job.name, "job started");
        }
        SchedulerEvent::Completed(result) => {
            info!(
                event = event.name(),
                job_id = %result.job_id,
                duration_ms = result.duration.as_millis() as u64,
                "job completed"
            );
        }
        SchedulerEvent::Failed(result) => {
            error!(
                event = event.name(),
                job_id = %result.job_id,
                duration_ms = result.duration.as_millis() as u64,
                error = result.error.as_deref().unwrap_or("unknown"),
                "job failed"
            );
        }
    }
}
