//! In-memory job store
//!
//! Jobs live in a sharded map, so a mutation holds only the lock of the
//! shard that owns the record and unrelated jobs proceed independently.

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Job, JobId, JobStats};

/// Source of truth for job state
#[derive(Default)]
pub struct JobStore {
    jobs: Arc<DashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a queued job for an upload
    pub fn create(&self, filename: impl Into<String>) -> JobId {
        let job = Job::new(filename);
        let job_id = job.id();
        self.jobs.insert(job_id, job);
        job_id
    }

    /// Snapshot of one job
    pub fn get(&self, job_id: JobId) -> Result<Job> {
        self.jobs
            .get(&job_id)
            .map(|job| job.clone())
            .ok_or_else(|| Error::job_not_found(job_id))
    }

    /// Apply a mutation to one job while holding its entry lock.
    ///
    /// Never inserts: a job deleted while its pipeline is still running stays
    /// deleted and the call returns `JobNotFound`.
    pub fn update<T, F>(&self, job_id: JobId, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Job) -> Result<T>,
    {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        mutate(job.value_mut())
    }

    /// Remove a job regardless of its status
    pub fn delete(&self, job_id: JobId) -> Result<Job> {
        self.jobs
            .remove(&job_id)
            .map(|(_, job)| job)
            .ok_or_else(|| Error::job_not_found(job_id))
    }

    /// Snapshot of all jobs, in no particular order
    pub fn list(&self) -> Vec<Job> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Remove every job matching `predicate`, returning how many went
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Job) -> bool,
    {
        let mut removed = 0;
        self.jobs.retain(|_, job| {
            let remove = predicate(job);
            if remove {
                removed += 1;
            }
            !remove
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Counts by status and mean completion time, from a snapshot
    pub fn stats(&self) -> JobStats {
        let snapshot = self.list();
        JobStats::from_jobs(&snapshot)
    }
}
