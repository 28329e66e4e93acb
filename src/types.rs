//! Core types for media-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for an export job
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh, random job id (`exp-<uuid>`)
    pub fn generate() -> Self {
        Self(format!("exp-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One source object to fetch and package into an export archive
///
/// Item descriptors are built by the event store and never mutated by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportItem {
    /// Item identifier (e.g. photo id)
    pub id: String,
    /// Location of the object in the platform's object storage
    pub source_url: String,
    /// User-facing file name, used (sanitized) as the archive entry name
    pub display_name: String,
}

impl ExportItem {
    /// Create a new item descriptor
    pub fn new(
        id: impl Into<String>,
        source_url: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            display_name: display_name.into(),
        }
    }
}

/// Billing plan tier of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Free promotional tier
    Freebie,
    /// Paid entry tier
    Basic,
    /// Full-featured tier
    Premium,
}

impl PlanTier {
    /// Whether events on this tier may request a bulk export
    pub fn allows_bulk_export(&self) -> bool {
        matches!(self, PlanTier::Premium)
    }

    /// Lowercase name of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Freebie => "freebie",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, worker not started yet
    Pending,
    /// Worker is fetching and assembling items
    Processing,
    /// Finished with at least one archive
    Completed,
    /// Aborted or every item failed
    Failed,
}

impl JobStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Lowercase name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle order
    pub(crate) fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item that could not be included in any archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    /// Id of the failed item
    pub item_id: String,
    /// Machine-readable failure code (e.g. "timeout", "http_error")
    pub code: String,
    /// Human-readable reason
    pub reason: String,
}

/// A finalized, persisted archive shard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutput {
    /// 1-based shard number
    pub part: u32,
    /// Public download location returned by the object store
    pub url: String,
    /// Storage path of the archive (used for expiry cleanup)
    pub path: String,
    /// Size of the archive file in bytes
    pub size_bytes: u64,
    /// Number of entries in the archive
    pub entry_count: usize,
}

/// Polling snapshot of an export job
///
/// This is what `GET /export/{jobId}` returns. Archive locations are only
/// published once the job is terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    /// Job id
    pub id: JobId,
    /// Event being exported
    pub event_id: String,
    /// Current status
    pub status: JobStatus,
    /// Progress in percent (0-100)
    pub progress_percent: f32,
    /// Number of items in the job
    pub total_items: usize,
    /// Number of items handled so far (success or failure)
    pub processed_items: usize,
    /// Archive shards (empty until the job is terminal)
    pub outputs: Vec<ArchiveOutput>,
    /// Items that could not be included
    pub failed_items: Vec<FailedItem>,
    /// Job-level fatal error
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Time after which the job and its archives are removed
    pub expires_at: DateTime<Utc>,
}

/// Audit event emitted during the export lifecycle
///
/// Events are broadcast to subscribers (see [`crate::ExportManager::subscribe`])
/// and streamed over `GET /events`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was created and its worker scheduled
    ExportInitiated {
        /// Job id
        job_id: JobId,
        /// Event id
        event_id: String,
        /// Number of items to export
        total_items: usize,
    },

    /// An item was processed
    ExportProgress {
        /// Job id
        job_id: JobId,
        /// Items processed so far
        processed_items: usize,
        /// Total items
        total_items: usize,
        /// Items failed so far
        failed_items: usize,
    },

    /// An archive shard was finalized and persisted
    ArchiveReady {
        /// Job id
        job_id: JobId,
        /// Shard number
        part: u32,
        /// Archive size in bytes
        size_bytes: u64,
        /// Entries in the shard
        entry_count: usize,
    },

    /// A job completed with at least one archive
    ExportCompleted {
        /// Job id
        job_id: JobId,
        /// Event id
        event_id: String,
        /// Total items
        total_items: usize,
        /// Number of archive shards
        archives: usize,
        /// Number of failed items
        failed_items: usize,
    },

    /// A job failed
    ExportFailed {
        /// Job id
        job_id: JobId,
        /// Event id
        event_id: String,
        /// Fatal error
        error: String,
        /// Total items
        total_items: usize,
        /// Number of archive shards persisted before the failure
        archives: usize,
        /// Number of failed items
        failed_items: usize,
    },

    /// An expired job and its archives were removed
    ExportExpired {
        /// Job id
        job_id: JobId,
        /// Event id
        event_id: String,
    },

    /// The export manager is shutting down
    Shutdown,
}

impl Event {
    /// Stable name of the event type (matches the serialized `type` tag)
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ExportInitiated { .. } => "export_initiated",
            Event::ExportProgress { .. } => "export_progress",
            Event::ArchiveReady { .. } => "archive_ready",
            Event::ExportCompleted { .. } => "export_completed",
            Event::ExportFailed { .. } => "export_failed",
            Event::ExportExpired { .. } => "export_expired",
            Event::Shutdown => "shutdown",
        }
    }
}
