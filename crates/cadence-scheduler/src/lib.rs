//! In-process job scheduler for recurring and one-off work.
//!
//! This crate provides a scheduler that:
//! - Runs jobs on a coarse frequency or a limited cron subset
//! - Never runs the same job concurrently with itself
//! - Retries failures with a fixed backoff, then disables the job
//! - Persists job metadata (not handlers) to a JSON file across restarts
//! - Broadcasts lifecycle events to subscribers

mod config;
pub mod cron;
mod error;
mod events;
mod handler;
mod persistence;
mod scheduler;
mod store;
mod types;

pub use config::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_RETRIES, DEFAULT_PERSISTENCE_PATH, SchedulerConfig,
};
pub use cron::CronShape;
pub use error::{Result, SchedulerError};
pub use events::{EVENT_CHANNEL_CAPACITY, SchedulerEvent};
pub use handler::{HandlerFuture, HandlerRegistry, JobHandler, handler_fn, stub_handler};
pub use persistence::JobPersistence;
pub use scheduler::Scheduler;
pub use store::JobStore;
pub use types::{Frequency, Job, JobResult, JobSpec, JobStatus, RETRY_BACKOFF_SECS, SchedulerStats};
