//! Export job handlers.

use super::{
    CreateExportRequest, CreateExportResponse, ListExportsQuery, require_non_blank,
};
use crate::api::AppState;
use crate::types::{JobId, JobView};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /export - Start a bulk export of an event
#[utoipa::path(
    post,
    path = "/api/v1/export",
    tag = "exports",
    request_body = CreateExportRequest,
    responses(
        (status = 202, description = "Export job accepted", body = CreateExportResponse),
        (status = 401, description = "Caller may not export this event", body = crate::error::ApiError),
        (status = 403, description = "Plan does not include bulk export", body = crate::error::ApiError),
        (status = 404, description = "Event not found", body = crate::error::ApiError),
        (status = 409, description = "An export of this event is already running", body = crate::error::ApiError),
        (status = 422, description = "Event has no items or too many items", body = crate::error::ApiError),
        (status = 429, description = "Export quota exhausted", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_export(
    State(state): State<AppState>,
    Json(request): Json<CreateExportRequest>,
) -> Response {
    if let Err(e) = require_non_blank("eventId", &request.event_id)
        .and_then(|()| require_non_blank("callerIdentity", &request.caller_identity))
    {
        return e.into_response();
    }

    let job_id = match state
        .manager
        .create_job(&request.event_id, &request.caller_identity)
        .await
    {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.manager.get_job(&job_id).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(CreateExportResponse {
                job_id,
                status: job.status,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /export/{jobId} - Poll an export job
#[utoipa::path(
    get,
    path = "/api/v1/export/{jobId}",
    tag = "exports",
    params(
        ("jobId" = String, Path, description = "Export job id")
    ),
    responses(
        (status = 200, description = "Current job state", body = JobView),
        (status = 404, description = "Job not found or expired", body = crate::error::ApiError)
    )
)]
pub async fn get_export(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.manager.job_view(&JobId::from(job_id)).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /export - List export jobs
#[utoipa::path(
    get,
    path = "/api/v1/export",
    tag = "exports",
    params(ListExportsQuery),
    responses(
        (status = 200, description = "Jobs, oldest first", body = Vec<JobView>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_exports(
    State(state): State<AppState>,
    Query(query): Query<ListExportsQuery>,
) -> Response {
    match state.manager.list_jobs(query.event_id.as_deref()).await {
        Ok(jobs) => {
            let views: Vec<JobView> = jobs.iter().map(|job| job.view()).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => e.into_response(),
    }
}
