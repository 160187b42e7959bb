//! Job scheduler implementation.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use tokio::sync::{Mutex, Notify, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::events::{EVENT_CHANNEL_CAPACITY, SchedulerEvent};
use crate::handler::{HandlerRegistry, JobHandler};
use crate::persistence::JobPersistence;
use crate::store::JobStore;
use crate::types::{Frequency, Job, JobResult, JobSpec, JobStatus, SchedulerStats};

/// Everything the tick loop and executions mutate, guarded by one lock so
/// that due-check and executing-set insertion happen atomically.
#[derive(Default)]
struct SchedulerState {
    store: JobStore,
    /// Ids of jobs with an execution in flight.
    executing: HashSet<String>,
    registry: HandlerRegistry,
}

struct Ticker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The job scheduler.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    config: Arc<SchedulerConfig>,
    state: Arc<RwLock<SchedulerState>>,
    persistence: Option<JobPersistence>,
    /// Serializes writes so the newest snapshot always lands last.
    persist_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<SchedulerEvent>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    /// Signalled whenever an execution finishes.
    finished: Arc<Notify>,
}

impl Scheduler {
    /// Create a new scheduler. Nothing runs until [`Scheduler::start`].
    pub fn new(config: SchedulerConfig) -> Self {
        let persistence = config
            .persist_jobs
            .then(|| JobPersistence::new(config.persistence_path.clone()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(SchedulerState::default())),
            persistence,
            persist_lock: Arc::new(Mutex::new(())),
            events,
            ticker: Arc::new(Mutex::new(None)),
            finished: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Load persisted jobs, if persistence is enabled.
    ///
    /// Each loaded job gets the handler registered under its name, or a stub
    /// that logs a warning and does nothing. Ids already known to this
    /// scheduler keep their in-memory record. Returns the number of jobs loaded.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self) -> usize {
        let Some(persistence) = &self.persistence else {
            return 0;
        };

        let jobs = persistence.load().await;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut count = 0;
        let mut unbound = 0;
        for job in jobs {
            if state.store.contains(&job.id) {
                debug!(job_id = %job.id, "skipping loaded job already in memory");
                continue;
            }
            count += 1;
            if !state.registry.contains(&job.name) {
                unbound += 1;
            }
            let handler = state.registry.resolve(&job.name, &job.id);
            state.store.insert(job, handler);
        }

        info!(count, unbound, "loaded jobs from disk");
        count
    }

    /// Register the handler for jobs named `name`.
    ///
    /// Jobs already in the store with that name are rebound immediately;
    /// jobs loaded later by [`Scheduler::initialize`] pick it up by name.
    /// Returns the number of jobs rebound.
    pub async fn register_handler(&self, name: impl Into<String>, handler: JobHandler) -> usize {
        let name = name.into();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let rebound = state.store.rebind_by_name(&name, &handler);
        state.registry.register(name.clone(), handler);
        debug!(name = %name, rebound, "registered job handler");
        rebound
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Schedule a new job. Returns its generated id.
    #[tracing::instrument(skip(self, spec), fields(name = %spec.name, frequency = ?spec.frequency))]
    pub async fn schedule_job(&self, spec: JobSpec) -> Result<String> {
        spec.validate()?;

        let id = format!("job-{}", Uuid::new_v4());
        let (job, handler) = spec.into_job(id.clone(), self.config.default_max_retries);

        {
            let mut state = self.state.write().await;
            state.store.insert(job.clone(), handler);
            // Emitted under the lock so no tick can report the job first.
            info!(job_id = %id, next_run = %job.next_run_time, "scheduled job");
            self.emit(SchedulerEvent::Scheduled(job));
        }

        self.persist_if_enabled().await;

        Ok(id)
    }

    /// Cancel a job.
    ///
    /// Returns `false` for unknown ids and for jobs with an execution in
    /// flight; running handlers are never interrupted.
    pub async fn cancel_job(&self, id: &str) -> bool {
        let job = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            if state.executing.contains(id) {
                debug!(job_id = %id, "cannot cancel running job");
                return false;
            }

            let Some(job) = state.store.get_mut(id) else {
                return false;
            };
            job.status = JobStatus::Cancelled;
            job.enabled = false;
            job.clone()
        };

        self.persist_if_enabled().await;
        info!(job_id = %id, name = %job.name, "cancelled job");
        self.emit(SchedulerEvent::Cancelled(job));
        true
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &str) -> Option<Job> {
        self.state.read().await.store.get(id).cloned()
    }

    /// List all jobs.
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.state.read().await.store.snapshot()
    }

    /// List jobs with the given status.
    pub async fn jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.state.read().await.store.by_status(status)
    }

    /// Job counts per status plus the ids currently executing.
    pub async fn statistics(&self) -> SchedulerStats {
        let state = self.state.read().await;
        let mut running: Vec<String> = state.executing.iter().cloned().collect();
        running.sort();
        SchedulerStats::from_jobs(state.store.iter(), running)
    }

    /// Whether the periodic tick is active.
    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    /// Start ticking. Runs one tick immediately. Calling again is a no-op.
    pub async fn start(&self) {
        {
            let mut ticker = self.ticker.lock().await;
            if ticker.is_some() {
                debug!("scheduler already running");
                return;
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let this = self.clone();
            let handle = tokio::spawn(async move { this.run_ticker(shutdown_rx).await });
            *ticker = Some(Ticker {
                shutdown_tx,
                handle,
            });
        }

        info!(interval = ?self.config.check_interval, "scheduler started");
        self.tick().await;
    }

    /// Stop ticking. In-flight executions run to completion.
    pub async fn stop(&self) {
        let Some(ticker) = self.ticker.lock().await.take() else {
            return;
        };

        let _ = ticker.shutdown_tx.send(true);
        if let Err(e) = ticker.handle.await {
            warn!(error = %e, "ticker task ended abnormally");
        }
        info!("scheduler stopped");
    }

    /// Wait until no execution is in flight.
    ///
    /// Does not stop new dispatches; call [`Scheduler::stop`] first to drain.
    pub async fn wait_idle(&self) {
        loop {
            let finished = self.finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();

            if self.state.read().await.executing.is_empty() {
                return;
            }
            finished.await;
        }
    }

    /// Write all jobs to the persistence file now.
    ///
    /// A no-op when persistence is disabled.
    pub async fn flush(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let jobs = self.state.read().await.store.snapshot();
        persistence.persist(&jobs).await
    }

    /// Dispatch every job due now.
    pub async fn tick(&self) -> Vec<JoinHandle<()>> {
        self.tick_at(Utc::now()).await
    }

    /// Dispatch every job due at `now`.
    ///
    /// Each dispatched job runs in its own task; the returned handles
    /// complete when those executions (and their bookkeeping) finish.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let dispatched: Vec<(Job, JobHandler)> = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let mut dispatched = Vec::new();
            for id in state.store.due_ids(now) {
                if state.executing.contains(&id) {
                    continue;
                }
                let (Some(handler), Some(job)) = (state.store.handler(&id), state.store.get_mut(&id))
                else {
                    continue;
                };
                job.status = JobStatus::Running;
                dispatched.push((job.clone(), handler));
                state.executing.insert(id);
            }
            dispatched
        };

        if !dispatched.is_empty() {
            debug!(count = dispatched.len(), "dispatching due jobs");
        }

        dispatched
            .into_iter()
            .map(|(job, handler)| {
                self.emit(SchedulerEvent::Started(job.clone()));
                let this = self.clone();
                tokio::spawn(async move { this.run_job(job, handler, now).await })
            })
            .collect()
    }

    async fn run_ticker(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.config.check_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("ticker received shutdown signal");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Execute a single job and record the outcome.
    ///
    /// `dispatched_at` is the tick instant; completion time is measured from it.
    #[tracing::instrument(skip(self, job, handler, dispatched_at), fields(job_id = %job.id, name = %job.name))]
    async fn run_job(&self, job: Job, handler: JobHandler, dispatched_at: DateTime<Utc>) {
        info!("executing job");

        let start_time = Utc::now();
        let started = Instant::now();
        let outcome = self.invoke(&handler).await;
        let elapsed = started.elapsed();
        let end_time = Utc::now();
        let finished_at = dispatched_at + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero());

        let updated = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state.executing.remove(&job.id);

            state.store.get_mut(&job.id).map(|j| {
                j.last_run_time = Some(finished_at);
                match &outcome {
                    Ok(()) => record_success(j, finished_at),
                    Err(error) => record_failure(j, finished_at, error),
                }
                j.clone()
            })
        };

        self.persist_if_enabled().await;
        self.finished.notify_waiters();

        let Some(updated) = updated else {
            warn!("job disappeared during execution");
            return;
        };

        let result = JobResult {
            job_id: job.id.clone(),
            status: if outcome.is_ok() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            },
            start_time,
            end_time,
            duration: elapsed,
            error: outcome.err(),
            metadata: updated.metadata.clone(),
        };

        match result.status {
            JobStatus::Completed => self.emit(SchedulerEvent::Completed(result)),
            _ => self.emit(SchedulerEvent::Failed(result)),
        }
    }

    /// Run a handler, converting panics and timeouts into failures.
    async fn invoke(&self, handler: &JobHandler) -> std::result::Result<(), String> {
        let run = AssertUnwindSafe(async { handler().await }).catch_unwind();

        let outcome = match self.config.execution_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(
                        SchedulerError::ExecutionFailed(format!("timed out after {:?}", limit))
                            .to_string(),
                    );
                }
            },
            None => run.await,
        };

        outcome.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(SchedulerError::ExecutionFailed(format!("panic: {}", message)).to_string())
        })
    }

    async fn persist_if_enabled(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = self.flush().await {
            error!(error = %e, path = %persistence.path().display(), "failed to persist jobs");
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

fn record_success(job: &mut Job, finished_at: DateTime<Utc>) {
    job.retry_count = 0;
    if job.frequency == Frequency::Once {
        job.status = JobStatus::Completed;
        info!(job_id = %job.id, "one-shot job completed");
    } else {
        job.next_run_time = job.calculate_next_run(finished_at);
        job.status = JobStatus::Pending;
        debug!(job_id = %job.id, next_run = %job.next_run_time, "rescheduled recurring job");
    }
}

fn record_failure(job: &mut Job, finished_at: DateTime<Utc>, error: &str) {
    if job.has_retries_left() {
        job.retry_count += 1;
        job.status = JobStatus::Pending;
        job.next_run_time = finished_at + job.retry_delay();
        warn!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            next_retry = %job.next_run_time,
            error = %error,
            "job failed, scheduled retry"
        );
    } else {
        job.status = JobStatus::Failed;
        job.enabled = false;
        error!(
            job_id = %job.id,
            retry_count = job.retry_count,
            error = %error,
            "job failed, retries exhausted"
        );
    }
}
