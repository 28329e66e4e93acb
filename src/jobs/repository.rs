//! Job storage

use super::model::{ExportJob, JobUpdate};
use crate::error::{Error, JobError, Result};
use crate::types::JobId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for export job records
///
/// `update` is the only write path after insertion; implementations apply
/// the update with [`ExportJob::apply`] atomically with respect to other
/// writers of the same job.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job
    ///
    /// With `exclusive_per_event`, fails with [`Error::JobInProgress`] if a
    /// pending or processing job exists for the same event. The check and the
    /// insert are one atomic step.
    async fn insert(&self, job: ExportJob, exclusive_per_event: bool) -> Result<()>;

    /// Fetch a job by id
    async fn get(&self, id: &JobId) -> Result<Option<ExportJob>>;

    /// Apply an update and return the new state of the job
    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<ExportJob>;

    /// All jobs, optionally for one event, oldest first
    async fn list(&self, event_id: Option<&str>) -> Result<Vec<ExportJob>>;

    /// Remove and return terminal jobs that expired at or before `now`
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExportJob>>;
}

/// In-memory [`JobRepository`]
///
/// Job records are lost on restart, like the archives' download links once
/// they expire.
#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<HashMap<JobId, ExportJob>>,
}

impl MemoryJobRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: ExportJob, exclusive_per_event: bool) -> Result<()> {
        let mut jobs = self.jobs.write().await;

        if exclusive_per_event {
            if let Some(active) = jobs
                .values()
                .find(|j| j.event_id == job.event_id && j.is_active())
            {
                return Err(Error::JobInProgress {
                    event_id: job.event_id.clone(),
                    job_id: active.id.clone(),
                });
            }
        }

        if jobs.contains_key(&job.id) {
            return Err(Error::Other(format!("duplicate job id {}", job.id)));
        }

        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<ExportJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<ExportJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound { id: id.clone() })?;

        job.apply(update)?;
        Ok(job.clone())
    }

    async fn list(&self, event_id: Option<&str>) -> Result<Vec<ExportJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<ExportJob> = jobs
            .values()
            .filter(|j| event_id.is_none_or(|event_id| j.event_id == event_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExportJob>> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|j| j.is_expired(now))
            .map(|j| j.id.clone())
            .collect();

        Ok(expired.iter().filter_map(|id| jobs.remove(id)).collect())
    }
}
