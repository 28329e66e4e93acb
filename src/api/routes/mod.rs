//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`exports`] - Export job creation and polling
//! - [`proxy`] - Single-file download proxy
//! - [`system`] - Health, events, OpenAPI

use crate::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

mod exports;
mod proxy;
mod system;

pub use exports::*;
pub use proxy::*;
pub use system::*;

/// Request body for POST /export
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportRequest {
    /// Event whose media should be exported
    pub event_id: String,
    /// Identity of the caller requesting the export
    pub caller_identity: String,
}

/// Response for POST /export
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportResponse {
    /// Id to poll with GET /export/{jobId}
    pub job_id: JobId,
    /// Initial status (`pending` unless the worker already picked it up)
    pub status: JobStatus,
}

/// Query parameters for GET /export
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListExportsQuery {
    /// Only jobs for this event
    pub event_id: Option<String>,
}

/// Request body for POST /download
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Absolute URL of an object on an allowed storage origin
    pub url: String,
    /// Identity of the caller, used for the download quota
    pub caller_identity: String,
}

/// Reject blank identifiers before they reach the manager
pub(crate) fn require_non_blank(field: &str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
