//! In-memory job store.
//!
//! Authoritative while the process is alive. Iteration follows insertion
//! order, so ticks visit jobs in a stable order.

use chrono::{DateTime, Utc};

use crate::handler::JobHandler;
use crate::types::{Job, JobStatus};

struct StoredJob {
    job: Job,
    handler: JobHandler,
}

/// Job id → job record plus its in-memory handler.
#[derive(Default)]
pub struct JobStore {
    entries: Vec<StoredJob>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job, replacing any existing job with the same id.
    pub fn insert(&mut self, job: Job, handler: JobHandler) {
        match self.entries.iter_mut().find(|e| e.job.id == job.id) {
            Some(entry) => {
                entry.job = job;
                entry.handler = handler;
            }
            None => self.entries.push(StoredJob { job, handler }),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.entries.iter().find(|e| e.job.id == id).map(|e| &e.job)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.entries
            .iter_mut()
            .find(|e| e.job.id == id)
            .map(|e| &mut e.job)
    }

    pub fn handler(&self, id: &str) -> Option<JobHandler> {
        self.entries
            .iter()
            .find(|e| e.job.id == id)
            .map(|e| e.handler.clone())
    }

    /// Replace the handler of every job named `name`. Returns how many
    /// jobs were rebound.
    pub fn rebind_by_name(&mut self, name: &str, handler: &JobHandler) -> usize {
        let mut count = 0;
        for entry in self.entries.iter_mut().filter(|e| e.job.name == name) {
            entry.handler = handler.clone();
            count += 1;
        }
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().map(|e| &e.job)
    }

    /// Ids of jobs eligible to run at `now`, in store order.
    pub fn due_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.iter()
            .filter(|j| j.is_due(now))
            .map(|j| j.id.clone())
            .collect()
    }

    pub fn by_status(&self, status: JobStatus) -> Vec<Job> {
        self.iter().filter(|j| j.status == status).cloned().collect()
    }

    /// Clone every job record.
    pub fn snapshot(&self) -> Vec<Job> {
        self.iter().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
