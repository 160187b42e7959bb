//! Job handlers and the name-keyed handler registry.
//!
//! Handlers are closures owned by whichever subsystem registered the job.
//! They cannot be persisted, so a job reloaded from disk gets a stub handler
//! until its owner registers a real one under the job's name.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

/// Future returned by a handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// An executable job payload. `Err` carries a failure message.
pub type JobHandler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`JobHandler`].
pub fn handler_fn<F, Fut>(f: F) -> JobHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as HandlerFuture)
}

/// Handler installed on reloaded jobs that nobody has claimed yet.
///
/// Logs a warning and succeeds without doing any work.
pub fn stub_handler(job_id: &str) -> JobHandler {
    let job_id = job_id.to_string();
    handler_fn(move || {
        let job_id = job_id.clone();
        async move {
            warn!(job_id = %job_id, "job has no handler after reload, skipping payload");
            Ok(())
        }
    })
}

/// Handlers keyed by job name, used to rebind reloaded jobs.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, JobHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for jobs named `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: JobHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<JobHandler> {
        self.handlers.get(name).cloned()
    }

    /// Resolve the handler for a reloaded job, falling back to the stub.
    pub fn resolve(&self, name: &str, job_id: &str) -> JobHandler {
        self.get(name).unwrap_or_else(|| stub_handler(job_id))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("names", &names)
            .finish()
    }
}
