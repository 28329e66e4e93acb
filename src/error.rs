//! Error types for media-export
//!
//! This module provides the error taxonomy of the export pipeline:
//! - Synchronous request errors (authorization, plan tier, validation, quota)
//! - Per-item fetch failures ([`FetchError`]), recorded on the job rather than propagated
//! - Job-fatal archive and storage failures ([`ArchiveError`], [`StorageError`])
//! - Job state machine violations ([`JobError`])
//! - HTTP status code mapping and structured API error bodies

use crate::types::{JobId, JobStatus, PlanTier};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "archive.max_archive_bytes")
        key: Option<String>,
    },

    /// Caller may not export this event
    #[error("caller {caller} is not allowed to export event {event_id}")]
    Unauthorized {
        /// Caller identity supplied by the authentication layer
        caller: String,
        /// Event the caller tried to export
        event_id: String,
    },

    /// The event's plan tier does not include bulk export
    #[error("bulk export is not available on the {tier} plan (event {event_id})")]
    PlanIneligible {
        /// Event id
        event_id: String,
        /// Plan tier of the event
        tier: PlanTier,
    },

    /// Invalid request input (e.g. empty or oversized item list)
    #[error("validation error: {0}")]
    Validation(String),

    /// Event or job not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Another export job is still running for the event
    #[error("export job {job_id} is already in progress for event {event_id}")]
    JobInProgress {
        /// Event id
        event_id: String,
        /// The in-flight job
        job_id: JobId,
    },

    /// Caller exceeded a quota
    #[error("rate limit exceeded for {identifier}, retry after {retry_after_secs}s")]
    RateLimited {
        /// Rate limit key
        identifier: String,
        /// Seconds until the window resets
        retry_after_secs: u64,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new export jobs")]
    ShuttingDown,

    /// Fetching a remote object failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Archive assembly failed
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Persisting or deleting an archive failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Job state machine violation
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failure to fetch a single remote object
///
/// These are recoverable at the item level: the worker records them in
/// the job's failed items and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The URL is not on the storage allow-list; no request was made
    #[error("URL is not on the storage allow-list: {url}")]
    NotAllowed {
        /// The rejected URL
        url: String,
    },

    /// The fetch did not finish within the timeout
    #[error("fetch timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that was exceeded
        timeout_ms: u64,
    },

    /// The object exceeds the per-file size cap
    #[error("object exceeds the maximum size of {max_bytes} bytes")]
    TooLarge {
        /// The size cap
        max_bytes: u64,
    },

    /// Storage answered with a non-success status
    #[error("storage returned HTTP {status}")]
    HttpError {
        /// The HTTP status code
        status: u16,
    },

    /// Transport-level failure
    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetchError {
    /// Machine-readable code recorded on failed items
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::NotAllowed { .. } => "not_allowed",
            FetchError::Timeout { .. } => "timeout",
            FetchError::TooLarge { .. } => "too_large",
            FetchError::HttpError { .. } => "http_error",
            FetchError::NetworkError(_) => "network_error",
        }
    }
}

/// Archive assembly errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// Adding the entry would push the archive past its size cap
    ///
    /// Not fatal: the worker finalizes the current shard and starts a new one.
    #[error(
        "archive full: {current_bytes} + {entry_bytes} bytes would exceed {max_bytes} bytes"
    )]
    ArchiveFull {
        /// Bytes already in the archive
        current_bytes: u64,
        /// Size of the rejected entry
        entry_bytes: u64,
        /// Archive size cap
        max_bytes: u64,
    },

    /// A single entry is larger than an entire archive may be
    #[error("entry of {entry_bytes} bytes exceeds the archive size cap of {max_bytes} bytes")]
    EntryTooLarge {
        /// Size of the rejected entry
        entry_bytes: u64,
        /// Archive size cap
        max_bytes: u64,
    },

    /// Zip encoder failure
    #[error("zip error: {0}")]
    Zip(String),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        ArchiveError::Zip(e.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(e: std::io::Error) -> Self {
        ArchiveError::Zip(e.to_string())
    }
}

/// Object store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Writing an archive failed
    #[error("failed to write {path}: {reason}")]
    WriteFailed {
        /// Storage path
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Deleting an archive failed
    #[error("failed to delete {path}: {reason}")]
    DeleteFailed {
        /// Storage path
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// The storage path is not acceptable (absolute, traversal, empty)
    #[error("invalid storage path {path}: {reason}")]
    InvalidPath {
        /// Storage path
        path: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Job state machine errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// Job not found in the repository
    #[error("export job {id} not found")]
    NotFound {
        /// Job id
        id: JobId,
    },

    /// The job already reached a terminal state
    #[error("export job {id} is already {status} and cannot be modified")]
    Terminal {
        /// Job id
        id: JobId,
        /// Terminal status
        status: JobStatus,
    },

    /// The requested status change goes against the lifecycle order
    #[error("export job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Job id
        id: JobId,
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// More items reported as processed than the job contains
    #[error("export job {id} already processed all {total} items")]
    ProgressOverflow {
        /// Job id
        id: JobId,
        /// Total item count
        total: usize,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_in_progress",
///     "message": "export job exp-1 is already in progress for event evt-9",
///     "details": {
///       "job_id": "exp-1",
///       "event_id": "evt-9"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "rate_limited")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400/422 - Client errors
            Error::Config { .. } => 400,
            Error::Validation(_) => 422,

            // 401/403 - Access
            Error::Unauthorized { .. } => 401,
            Error::PlanIneligible { .. } => 403,
            Error::Fetch(FetchError::NotAllowed { .. }) => 403,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Job(JobError::NotFound { .. }) => 404,

            // 409 Conflict
            Error::JobInProgress { .. } => 409,
            Error::Job(JobError::Terminal { .. }) => 409,
            Error::Job(JobError::InvalidTransition { .. }) => 409,

            // 413 Payload Too Large
            Error::Fetch(FetchError::TooLarge { .. }) => 413,

            // 429 Too Many Requests
            Error::RateLimited { .. } => 429,

            // 500 Internal Server Error
            Error::Job(JobError::ProgressOverflow { .. }) => 500,
            Error::Archive(_) => 500,
            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502/504 - Upstream storage errors
            Error::Fetch(FetchError::HttpError { .. }) => 502,
            Error::Fetch(FetchError::NetworkError(_)) => 502,
            Error::Fetch(FetchError::Timeout { .. }) => 504,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Unauthorized { .. } => "unauthorized",
            Error::PlanIneligible { .. } => "plan_ineligible",
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::JobInProgress { .. } => "job_in_progress",
            Error::RateLimited { .. } => "rate_limited",
            Error::ShuttingDown => "shutting_down",
            Error::Fetch(e) => match e {
                FetchError::NotAllowed { .. } => "url_not_allowed",
                FetchError::Timeout { .. } => "upstream_timeout",
                FetchError::TooLarge { .. } => "too_large",
                FetchError::HttpError { .. } => "upstream_http_error",
                FetchError::NetworkError(_) => "network_error",
            },
            Error::Archive(e) => match e {
                ArchiveError::ArchiveFull { .. } => "archive_full",
                ArchiveError::EntryTooLarge { .. } => "entry_too_large",
                ArchiveError::Zip(_) => "archive_error",
            },
            Error::Storage(e) => match e {
                StorageError::WriteFailed { .. } => "storage_write_failed",
                StorageError::DeleteFailed { .. } => "storage_delete_failed",
                StorageError::InvalidPath { .. } => "invalid_storage_path",
            },
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "job_not_found",
                JobError::Terminal { .. } => "job_terminal",
                JobError::InvalidTransition { .. } => "invalid_transition",
                JobError::ProgressOverflow { .. } => "progress_overflow",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Unauthorized { event_id, .. } => Some(serde_json::json!({
                "event_id": event_id,
            })),
            Error::PlanIneligible { event_id, tier } => Some(serde_json::json!({
                "event_id": event_id,
                "tier": tier,
            })),
            Error::JobInProgress { event_id, job_id } => Some(serde_json::json!({
                "event_id": event_id,
                "job_id": job_id,
            })),
            Error::RateLimited {
                retry_after_secs, ..
            } => Some(serde_json::json!({
                "retry_after_seconds": retry_after_secs,
            })),
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Fetch(FetchError::HttpError { status }) => Some(serde_json::json!({
                "upstream_status": status,
            })),
            Error::Fetch(FetchError::TooLarge { max_bytes }) => Some(serde_json::json!({
                "max_bytes": max_bytes,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_status_code, expected_error_code) for every
    /// match arm in ToHttpStatus.
    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        let id = JobId::from("exp-1");
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("archive.max_archive_bytes".into()),
                },
                400,
                "config_error",
            ),
            (
                Error::Unauthorized {
                    caller: "mallory".into(),
                    event_id: "evt".into(),
                },
                401,
                "unauthorized",
            ),
            (
                Error::PlanIneligible {
                    event_id: "evt".into(),
                    tier: PlanTier::Basic,
                },
                403,
                "plan_ineligible",
            ),
            (Error::Validation("no items".into()), 422, "validation_error"),
            (Error::NotFound("event evt".into()), 404, "not_found"),
            (
                Error::JobInProgress {
                    event_id: "evt".into(),
                    job_id: id.clone(),
                },
                409,
                "job_in_progress",
            ),
            (
                Error::RateLimited {
                    identifier: "export:alice".into(),
                    retry_after_secs: 30,
                },
                429,
                "rate_limited",
            ),
            (Error::ShuttingDown, 503, "shutting_down"),
            (
                Error::Fetch(FetchError::NotAllowed {
                    url: "https://evil.example".into(),
                }),
                403,
                "url_not_allowed",
            ),
            (
                Error::Fetch(FetchError::Timeout { timeout_ms: 1000 }),
                504,
                "upstream_timeout",
            ),
            (
                Error::Fetch(FetchError::TooLarge { max_bytes: 10 }),
                413,
                "too_large",
            ),
            (
                Error::Fetch(FetchError::HttpError { status: 404 }),
                502,
                "upstream_http_error",
            ),
            (
                Error::Fetch(FetchError::NetworkError("reset".into())),
                502,
                "network_error",
            ),
            (
                Error::Archive(ArchiveError::ArchiveFull {
                    current_bytes: 1,
                    entry_bytes: 2,
                    max_bytes: 2,
                }),
                500,
                "archive_full",
            ),
            (
                Error::Archive(ArchiveError::EntryTooLarge {
                    entry_bytes: 5,
                    max_bytes: 2,
                }),
                500,
                "entry_too_large",
            ),
            (
                Error::Archive(ArchiveError::Zip("broken".into())),
                500,
                "archive_error",
            ),
            (
                Error::Storage(StorageError::WriteFailed {
                    path: "a.zip".into(),
                    reason: "disk full".into(),
                }),
                500,
                "storage_write_failed",
            ),
            (
                Error::Storage(StorageError::DeleteFailed {
                    path: "a.zip".into(),
                    reason: "gone".into(),
                }),
                500,
                "storage_delete_failed",
            ),
            (
                Error::Storage(StorageError::InvalidPath {
                    path: "../a.zip".into(),
                    reason: "traversal".into(),
                }),
                500,
                "invalid_storage_path",
            ),
            (
                Error::Job(JobError::NotFound { id: id.clone() }),
                404,
                "job_not_found",
            ),
            (
                Error::Job(JobError::Terminal {
                    id: id.clone(),
                    status: JobStatus::Completed,
                }),
                409,
                "job_terminal",
            ),
            (
                Error::Job(JobError::InvalidTransition {
                    id: id.clone(),
                    from: JobStatus::Processing,
                    to: JobStatus::Pending,
                }),
                409,
                "invalid_transition",
            ),
            (
                Error::Job(JobError::ProgressOverflow { id, total: 3 }),
                500,
                "progress_overflow",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
            (Error::Other("unknown".into()), 500, "internal_error"),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "status for {error:?}");
            assert_eq!(error.error_code(), code, "code for {error:?}");
        }
    }

    #[test]
    fn serialization_error_maps_to_500() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = Error::Serialization(err);
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), "serialization_error");
    }

    #[test]
    fn rate_limited_api_error_carries_retry_after() {
        let api_error: ApiError = Error::RateLimited {
            identifier: "export:alice".into(),
            retry_after_secs: 42,
        }
        .into();

        assert_eq!(api_error.error.code, "rate_limited");
        assert_eq!(api_error.error.details.unwrap()["retry_after_seconds"], 42);
    }

    #[test]
    fn job_in_progress_api_error_names_the_running_job() {
        let api_error: ApiError = Error::JobInProgress {
            event_id: "evt-9".into(),
            job_id: JobId::from("exp-1"),
        }
        .into();

        let details = api_error.error.details.unwrap();
        assert_eq!(details["job_id"], "exp-1");
        assert_eq!(details["event_id"], "evt-9");
        assert!(api_error.error.message.contains("exp-1"));
    }

    #[test]
    fn fetch_error_codes_are_stable() {
        assert_eq!(FetchError::HttpError { status: 404 }.code(), "http_error");
        assert_eq!(FetchError::Timeout { timeout_ms: 5 }.code(), "timeout");
        assert_eq!(
            FetchError::NotAllowed { url: "x".into() }.code(),
            "not_allowed"
        );
        assert_eq!(FetchError::TooLarge { max_bytes: 1 }.code(), "too_large");
        assert_eq!(FetchError::NetworkError("x".into()).code(), "network_error");
    }
}
