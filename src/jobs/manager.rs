//! Job creation, polling and the single-file download proxy

use super::model::{ExportJob, JobUpdate};
use super::repository::{JobRepository, MemoryJobRepository};
use super::worker;
use crate::config::Config;
use crate::error::{Error, JobError, Result};
use crate::fetcher::{AllowList, Fetch, FetchOptions, HttpFetcher};
use crate::rate_limiter::{self, RateLimiter};
use crate::store::{Authorizer, EventStore, LocalObjectStore, ObjectStore, validate_path};
use crate::types::{Event, JobId, JobView};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Capacity of the audit event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// External systems the manager depends on
#[derive(Clone)]
pub struct Collaborators {
    /// Event catalog (plan tiers and items)
    pub event_store: Arc<dyn EventStore>,
    /// Export permission check
    pub authorizer: Arc<dyn Authorizer>,
    /// Archive destination
    pub object_store: Arc<dyn ObjectStore>,
    /// Object fetcher used by workers and the download proxy
    pub fetcher: Arc<dyn Fetch>,
    /// Job storage
    pub repository: Arc<dyn JobRepository>,
}

impl Collaborators {
    /// Production wiring: HTTP fetcher, local object store and in-memory jobs
    pub fn from_config(
        config: &Config,
        event_store: Arc<dyn EventStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Result<Self> {
        let allow_list = AllowList::from_origins(&config.fetch.allowed_origins)?;
        Ok(Self {
            event_store,
            authorizer,
            object_store: Arc::new(LocalObjectStore::from_config(&config.storage)),
            fetcher: Arc::new(HttpFetcher::new(allow_list)?),
            repository: Arc::new(MemoryJobRepository::new()),
        })
    }

    /// Replace the object store
    pub fn with_object_store(mut self, object_store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = object_store;
        self
    }

    /// Replace the fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the job repository
    pub fn with_repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = repository;
        self
    }
}

/// Entry point of the export pipeline
///
/// Cheap to clone; all clones share jobs, quotas and the event channel.
#[derive(Clone)]
pub struct ExportManager {
    pub(crate) config: Arc<Config>,
    pub(crate) collaborators: Collaborators,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Jobs whose supervisor has not finished yet
    pub(crate) active_jobs: Arc<Mutex<HashSet<JobId>>>,
    /// Cleared by shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Stops the maintenance task
    pub(crate) maintenance_token: CancellationToken,
}

impl ExportManager {
    /// Create a manager after validating `config`
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        if config.fetch.allowed_origins.is_empty() {
            tracing::warn!("No storage origins are allowed; every fetch will be rejected");
        }

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.window));

        Ok(Self {
            config: Arc::new(config),
            collaborators,
            limiter,
            event_tx,
            active_jobs: Arc::new(Mutex::new(HashSet::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            maintenance_token: CancellationToken::new(),
        })
    }

    /// Configuration the manager runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared rate limiter
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Subscribe to audit events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Request an export of every item of `event_id` on behalf of `caller`
    ///
    /// All checks run before anything is stored, in this order: shutdown,
    /// authorization, plan tier, storage path, export quota, item list, one
    /// active job per event. On success the job is `pending`, its worker is scheduled, and
    /// the id is returned without waiting for any item.
    pub async fn create_job(&self, event_id: &str, caller: &str) -> Result<JobId> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        if !self
            .collaborators
            .authorizer
            .can_export(caller, event_id)
            .await?
        {
            tracing::warn!(event_id, caller, "Export denied");
            return Err(Error::Unauthorized {
                caller: caller.to_string(),
                event_id: event_id.to_string(),
            });
        }

        let tier = self
            .collaborators
            .event_store
            .plan_tier(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {event_id}")))?;
        if !tier.allows_bulk_export() {
            return Err(Error::PlanIneligible {
                event_id: event_id.to_string(),
                tier,
            });
        }

        let job_id = JobId::generate();
        validate_path(&worker::shard_path(event_id, &job_id, 1)).map_err(|e| {
            Error::Validation(format!(
                "event id {event_id:?} cannot be used in a storage path: {e}"
            ))
        })?;

        let key = rate_limiter::export_key(caller);
        let quota = self
            .limiter
            .try_acquire(&key, self.config.rate_limit.max_exports_per_window)
            .await;
        if !quota.allowed {
            return Err(Error::RateLimited {
                identifier: key,
                retry_after_secs: quota.retry_after_secs(),
            });
        }

        let items = self
            .collaborators
            .event_store
            .items_for_event(event_id)
            .await?;
        if items.is_empty() {
            return Err(Error::Validation(format!(
                "event {event_id} has no items to export"
            )));
        }
        let max_items = self.config.jobs.max_items_per_job;
        if items.len() > max_items {
            return Err(Error::Validation(format!(
                "event {event_id} has {} items, more than the maximum of {max_items} per export",
                items.len()
            )));
        }

        let job = ExportJob::new(
            job_id,
            event_id,
            caller,
            items.len(),
            self.config.jobs.job_retention,
        );
        let job_id = job.id.clone();
        self.collaborators
            .repository
            .insert(job, self.config.jobs.one_active_job_per_event)
            .await?;

        tracing::info!(
            job_id = %job_id,
            event_id,
            caller,
            total_items = items.len(),
            "Export job created"
        );
        self.emit(Event::ExportInitiated {
            job_id: job_id.clone(),
            event_id: event_id.to_string(),
            total_items: items.len(),
        });

        if let Err(e) = self.track_job(&job_id).await {
            self.fail_job(&job_id, e.to_string()).await;
            return Err(e);
        }
        self.spawn_supervised(job_id.clone(), items);
        Ok(job_id)
    }

    /// Register a job as running so shutdown waits for it
    ///
    /// Intake is re-checked after registering: a shutdown that started while
    /// the job was being created may already have seen an empty set.
    pub(crate) async fn track_job(&self, job_id: &JobId) -> Result<()> {
        self.active_jobs.lock().await.insert(job_id.clone());
        if self.is_accepting() {
            return Ok(());
        }

        self.active_jobs.lock().await.remove(job_id);
        tracing::warn!(job_id = %job_id, "Shutdown started while the job was created");
        Err(Error::ShuttingDown)
    }

    /// Run the worker in its own task and turn any error or panic into a failed job
    fn spawn_supervised(&self, job_id: JobId, items: Vec<crate::types::ExportItem>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let worker_manager = manager.clone();
            let worker_id = job_id.clone();
            let outcome =
                tokio::spawn(async move { worker::run(&worker_manager, &worker_id, items).await })
                    .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => manager.fail_job(&job_id, e.to_string()).await,
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        "export worker panicked".to_string()
                    } else {
                        format!("export worker stopped: {join_error}")
                    };
                    manager.fail_job(&job_id, reason).await;
                }
            }

            manager.active_jobs.lock().await.remove(&job_id);
        });
    }

    /// Full job record
    pub async fn get_job(&self, id: &JobId) -> Result<ExportJob> {
        self.collaborators
            .repository
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound { id: id.clone() }.into())
    }

    /// Polling snapshot of a job
    pub async fn job_view(&self, id: &JobId) -> Result<JobView> {
        Ok(self.get_job(id).await?.view())
    }

    /// All jobs, optionally for one event, oldest first
    pub async fn list_jobs(&self, event_id: Option<&str>) -> Result<Vec<ExportJob>> {
        self.collaborators.repository.list(event_id).await
    }

    /// Apply a job update through the repository
    pub(crate) async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<ExportJob> {
        self.collaborators.repository.update(id, update).await
    }

    /// Mark a job failed and announce it; a job that already finished is left alone
    pub(crate) async fn fail_job(&self, id: &JobId, error: String) {
        match self
            .update_job(id, JobUpdate::Fail {
                error: error.clone(),
            })
            .await
        {
            Ok(job) => {
                tracing::error!(
                    job_id = %id,
                    event_id = %job.event_id,
                    error = %error,
                    processed_items = job.processed_items,
                    archives = job.outputs.len(),
                    "Export job failed"
                );
                self.emit(Event::ExportFailed {
                    job_id: id.clone(),
                    event_id: job.event_id.clone(),
                    error,
                    total_items: job.total_items,
                    archives: job.outputs.len(),
                    failed_items: job.failed_items.len(),
                });
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Could not mark export job failed");
            }
        }
    }

    /// Fetch one allow-listed object on behalf of `caller`
    ///
    /// Counts against the caller's download quota whether or not the fetch
    /// succeeds.
    pub async fn proxy_download(&self, url: &str, caller: &str) -> Result<Vec<u8>> {
        let key = rate_limiter::download_key(caller);
        let quota = self
            .limiter
            .try_acquire(&key, self.config.rate_limit.max_downloads_per_window)
            .await;
        if !quota.allowed {
            return Err(Error::RateLimited {
                identifier: key,
                retry_after_secs: quota.retry_after_secs(),
            });
        }

        let options = FetchOptions::from(&self.config.fetch);
        match self.collaborators.fetcher.fetch(url, &options).await {
            Ok(bytes) => {
                tracing::debug!(caller, size = bytes.len(), "Proxied download");
                Ok(bytes)
            }
            Err(e) => {
                tracing::warn!(caller, url, error = %e, "Proxied download failed");
                Err(e.into())
            }
        }
    }
}
