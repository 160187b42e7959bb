//! Lifecycle events broadcast to scheduler subscribers.

use crate::types::{Job, JobResult};

/// Broadcast channel capacity. Slow subscribers past this lag and lose events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Update event for scheduler subscribers.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job was registered.
    Scheduled(Job),
    /// A job began executing.
    Started(Job),
    /// An execution attempt succeeded.
    Completed(JobResult),
    /// An execution attempt failed.
    Failed(JobResult),
    /// A job was cancelled.
    Cancelled(Job),
}

impl SchedulerEvent {
    /// Event name, e.g. `job:completed`.
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerEvent::Scheduled(_) => "job:scheduled",
            SchedulerEvent::Started(_) => "job:started",
            SchedulerEvent::Completed(_) => "job:completed",
            SchedulerEvent::Failed(_) => "job:failed",
            SchedulerEvent::Cancelled(_) => "job:cancelled",
        }
    }

    /// Id of the job the event is about.
    pub fn job_id(&self) -> &str {
        match self {
            SchedulerEvent::Scheduled(job)
            | SchedulerEvent::Started(job)
            | SchedulerEvent::Cancelled(job) => &job.id,
            SchedulerEvent::Completed(result) | SchedulerEvent::Failed(result) => &result.job_id,
        }
    }
}
