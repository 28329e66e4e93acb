//! Background execution of one export job
//!
//! The worker walks the job's items in order. Each item is fetched under the
//! owner's fetch quota and added to the current archive; when an archive is
//! full it is finalized and persisted, and the item goes into a fresh one.
//! Item-level failures are recorded on the job and never stop the loop.
//! Errors returned from [`run`] are job-fatal; the supervisor records them.

use super::manager::ExportManager;
use super::model::{ALL_ITEMS_FAILED, JobUpdate};
use crate::archive::{ArchiveBuilder, FinishedArchive, entry_name_for};
use crate::error::{ArchiveError, Error, Result};
use crate::fetcher::{FetchOptions, fetch_with_retry};
use crate::rate_limiter;
use crate::retry::with_retry;
use crate::types::{ArchiveOutput, Event, ExportItem, FailedItem, JobId};
use tokio::task::spawn_blocking;

/// Storage path of one archive shard
pub(crate) fn shard_path(event_id: &str, job_id: &JobId, part: u32) -> String {
    format!("exports/{event_id}/{job_id}/{event_id}-part-{part}.zip")
}

/// Export every item of a job
pub(crate) async fn run(
    manager: &ExportManager,
    job_id: &JobId,
    items: Vec<ExportItem>,
) -> Result<()> {
    let job = manager.update_job(job_id, JobUpdate::Start).await?;
    tracing::info!(
        job_id = %job_id,
        event_id = %job.event_id,
        total_items = job.total_items,
        "Export job started"
    );

    let mut worker = ExportWorker {
        manager,
        job_id,
        event_id: job.event_id,
        owner: job.owner,
        builder: None,
        next_part: 1,
        archives: 0,
    };

    for item in &items {
        let failure = worker.process_item(item).await?;
        if let Some(failure) = &failure {
            tracing::warn!(
                job_id = %job_id,
                item_id = %failure.item_id,
                code = %failure.code,
                reason = %failure.reason,
                "Item left out of export"
            );
        }

        let job = manager
            .update_job(job_id, JobUpdate::ItemProcessed { failure })
            .await?;
        tracing::debug!(
            job_id = %job_id,
            item_id = %item.id,
            processed_items = job.processed_items,
            total_items = job.total_items,
            "Item processed"
        );
        manager.emit(Event::ExportProgress {
            job_id: job_id.clone(),
            processed_items: job.processed_items,
            total_items: job.total_items,
            failed_items: job.failed_items.len(),
        });
    }

    if let Some(builder) = worker.builder.take() {
        if !builder.is_empty() {
            worker.persist(builder).await?;
        }
    }

    if worker.archives == 0 {
        manager.fail_job(job_id, ALL_ITEMS_FAILED.to_string()).await;
        return Ok(());
    }

    let job = manager.update_job(job_id, JobUpdate::Complete).await?;
    tracing::info!(
        job_id = %job_id,
        event_id = %job.event_id,
        archives = job.outputs.len(),
        failed_items = job.failed_items.len(),
        "Export job completed"
    );
    manager.emit(Event::ExportCompleted {
        job_id: job_id.clone(),
        event_id: job.event_id.clone(),
        total_items: job.total_items,
        archives: job.outputs.len(),
        failed_items: job.failed_items.len(),
    });

    Ok(())
}

struct ExportWorker<'a> {
    manager: &'a ExportManager,
    job_id: &'a JobId,
    event_id: String,
    owner: String,
    /// Archive under construction, created on first use
    builder: Option<ArchiveBuilder>,
    next_part: u32,
    archives: usize,
}

impl ExportWorker<'_> {
    /// Handle one item, returning why it was left out (if it was)
    async fn process_item(&mut self, item: &ExportItem) -> Result<Option<FailedItem>> {
        if let Err(e) = acquire_fetch_quota(self.manager, &self.owner).await {
            return Ok(Some(failed_item(item, "rate_limited", &e)));
        }

        let config = &self.manager.config;
        let options = FetchOptions::from(&config.fetch);
        let bytes = match fetch_with_retry(
            self.manager.collaborators.fetcher.as_ref(),
            &item.source_url,
            &options,
            &config.fetch.retry,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Some(failed_item(item, e.code(), &e))),
        };

        let name = entry_name_for(item, config.archive.max_entry_name_len);
        self.add_to_archive(item, name, bytes).await
    }

    /// Add an entry, starting a new shard when the current one is full
    async fn add_to_archive(
        &mut self,
        item: &ExportItem,
        name: String,
        bytes: Vec<u8>,
    ) -> Result<Option<FailedItem>> {
        let archive_config = self.manager.config.archive.clone();
        let mut builder = self
            .builder
            .take()
            .unwrap_or_else(|| ArchiveBuilder::begin(&archive_config));

        let (builder_back, bytes, result) = add_blocking(builder, name.clone(), bytes).await?;
        builder = builder_back;

        let result = match result {
            Err(ArchiveError::ArchiveFull { .. }) => {
                self.persist(builder).await?;
                let (fresh, _, retried) =
                    add_blocking(ArchiveBuilder::begin(&archive_config), name, bytes).await?;
                builder = fresh;
                retried
            }
            other => other,
        };

        let outcome = match result {
            Ok(stored_name) => {
                tracing::debug!(
                    job_id = %self.job_id,
                    item_id = %item.id,
                    entry = %stored_name,
                    "Added archive entry"
                );
                Ok(None)
            }
            Err(e @ ArchiveError::EntryTooLarge { .. }) => {
                Ok(Some(failed_item(item, "entry_too_large", &e)))
            }
            Err(e) => Err(Error::Archive(e)),
        };

        self.builder = Some(builder);
        outcome
    }

    /// Finalize a shard, store it and record it on the job
    async fn persist(&mut self, builder: ArchiveBuilder) -> Result<()> {
        let finished: FinishedArchive = spawn_blocking(move || builder.finalize())
            .await
            .map_err(|e| Error::Other(format!("archive task failed: {e}")))??;

        let part = self.next_part;
        let path = shard_path(&self.event_id, self.job_id, part);
        let size_bytes = finished.size_bytes();
        let entry_count = finished.entry_count;

        let url = self
            .manager
            .collaborators
            .object_store
            .put(&path, finished.bytes)
            .await?;

        self.manager
            .update_job(
                self.job_id,
                JobUpdate::OutputAdded(ArchiveOutput {
                    part,
                    url,
                    path: path.clone(),
                    size_bytes,
                    entry_count,
                }),
            )
            .await?;
        self.next_part += 1;
        self.archives += 1;

        tracing::info!(
            job_id = %self.job_id,
            part,
            path = %path,
            size_bytes,
            entry_count,
            content_bytes = finished.content_bytes,
            "Archive shard stored"
        );
        self.manager.emit(Event::ArchiveReady {
            job_id: self.job_id.clone(),
            part,
            size_bytes,
            entry_count,
        });
        Ok(())
    }
}

/// Take one slot of the owner's fetch quota, backing off while it is exhausted
async fn acquire_fetch_quota(manager: &ExportManager, owner: &str) -> Result<()> {
    let key = rate_limiter::fetch_key(owner);
    let key = key.as_str();
    let limiter = manager.limiter.as_ref();
    let max = manager.config.rate_limit.max_fetches_per_window;

    with_retry(&manager.config.rate_limit.backoff, move || async move {
        let status = limiter.try_acquire(key, max).await;
        if status.allowed {
            Ok(())
        } else {
            Err(Error::RateLimited {
                identifier: key.to_string(),
                retry_after_secs: status.retry_after_secs(),
            })
        }
    })
    .await
}

type AddOutcome = (
    ArchiveBuilder,
    Vec<u8>,
    std::result::Result<String, ArchiveError>,
);

/// Run `add_entry` on the blocking pool, handing the builder and bytes back
async fn add_blocking(
    mut builder: ArchiveBuilder,
    name: String,
    bytes: Vec<u8>,
) -> Result<AddOutcome> {
    spawn_blocking(move || {
        let result = builder.add_entry(&name, &bytes);
        (builder, bytes, result)
    })
    .await
    .map_err(|e| Error::Other(format!("archive task failed: {e}")))
}

fn failed_item(item: &ExportItem, code: &str, reason: &dyn std::fmt::Display) -> FailedItem {
    FailedItem {
        item_id: item.id.clone(),
        code: code.to_string(),
        reason: reason.to_string(),
    }
}
