//! Export job record and its state machine

use crate::error::JobError;
use crate::types::{ArchiveOutput, FailedItem, JobId, JobStatus, JobView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job-level error recorded when no item made it into an archive
pub const ALL_ITEMS_FAILED: &str = "all items failed";

/// Full record of an export job
///
/// Records are only changed through [`ExportJob::apply`], which enforces the
/// lifecycle: `pending -> processing -> completed | failed`, with
/// `pending -> failed` for jobs whose worker never started. Terminal records
/// are immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    /// Job id
    pub id: JobId,
    /// Event being exported
    pub event_id: String,
    /// Caller who requested the export
    pub owner: String,
    /// Current status
    pub status: JobStatus,
    /// Number of items in the job
    pub total_items: usize,
    /// Items handled so far, successful or not
    pub processed_items: usize,
    /// Persisted archive shards, in part order
    pub outputs: Vec<ArchiveOutput>,
    /// Items left out of every archive
    pub failed_items: Vec<FailedItem>,
    /// Job-level fatal error
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time the worker started
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job became terminal
    pub completed_at: Option<DateTime<Utc>>,
    /// Time after which the job and its archives are removed
    pub expires_at: DateTime<Utc>,
}

/// A single change to an [`ExportJob`]
#[derive(Clone, Debug, PartialEq)]
pub enum JobUpdate {
    /// The worker picked the job up
    Start,
    /// One item was handled; `failure` is set when it was left out
    ItemProcessed {
        /// Why the item was left out
        failure: Option<FailedItem>,
    },
    /// An archive shard was persisted
    OutputAdded(ArchiveOutput),
    /// Every item was handled and at least one archive exists
    Complete,
    /// The job cannot finish
    Fail {
        /// Job-level error
        error: String,
    },
}

impl ExportJob {
    /// Create a pending job
    pub fn new(
        id: JobId,
        event_id: impl Into<String>,
        owner: impl Into<String>,
        total_items: usize,
        retention: Duration,
    ) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| created_at.checked_add_signed(retention))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            id,
            event_id: event_id.into(),
            owner: owner.into(),
            status: JobStatus::Pending,
            total_items,
            processed_items: 0,
            outputs: Vec::new(),
            failed_items: Vec::new(),
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
            expires_at,
        }
    }

    /// Whether the job is pending or processing
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Whether the job may be removed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_terminal() && now >= self.expires_at
    }

    /// Share of processed items, 100 for an empty job
    pub fn progress_percent(&self) -> f32 {
        if self.total_items == 0 {
            return 100.0;
        }
        (self.processed_items as f32 / self.total_items as f32) * 100.0
    }

    /// Storage paths of every persisted archive
    pub fn output_paths(&self) -> Vec<String> {
        self.outputs.iter().map(|o| o.path.clone()).collect()
    }

    /// Polling snapshot; archive locations appear once the job is terminal
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            event_id: self.event_id.clone(),
            status: self.status,
            progress_percent: self.progress_percent(),
            total_items: self.total_items,
            processed_items: self.processed_items,
            outputs: if self.status.is_terminal() {
                self.outputs.clone()
            } else {
                Vec::new()
            },
            failed_items: self.failed_items.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            expires_at: self.expires_at,
        }
    }

    /// Apply one update, rejecting anything that breaks the lifecycle
    ///
    /// The record is left untouched when an error is returned.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Terminal {
                id: self.id.clone(),
                status: self.status,
            });
        }

        match update {
            JobUpdate::Start => {
                self.transition(JobStatus::Processing)?;
                self.started_at = Some(Utc::now());
            }
            JobUpdate::ItemProcessed { failure } => {
                self.require_processing()?;
                if self.processed_items >= self.total_items {
                    return Err(JobError::ProgressOverflow {
                        id: self.id.clone(),
                        total: self.total_items,
                    });
                }
                self.processed_items += 1;
                self.failed_items.extend(failure);
            }
            JobUpdate::OutputAdded(output) => {
                self.require_processing()?;
                self.outputs.push(output);
            }
            JobUpdate::Complete => {
                if self.outputs.is_empty() {
                    return Err(self.invalid(JobStatus::Completed));
                }
                self.transition(JobStatus::Completed)?;
                self.completed_at = Some(Utc::now());
            }
            JobUpdate::Fail { error } => {
                self.transition(JobStatus::Failed)?;
                self.error = Some(error);
                self.completed_at = Some(Utc::now());
            }
        }

        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(to) {
            return Err(self.invalid(to));
        }
        self.status = to;
        Ok(())
    }

    fn require_processing(&self) -> Result<(), JobError> {
        if self.status == JobStatus::Processing {
            Ok(())
        } else {
            Err(self.invalid(JobStatus::Processing))
        }
    }

    fn invalid(&self, to: JobStatus) -> JobError {
        JobError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}
