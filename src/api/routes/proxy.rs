//! Single-file download proxy.

use super::{DownloadRequest, require_non_blank};
use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST /download - Fetch one object from allowed storage
///
/// The body is returned as `application/octet-stream`; the upstream content
/// type is not forwarded.
#[utoipa::path(
    post,
    path = "/api/v1/download",
    tag = "download",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "Object bytes", content_type = "application/octet-stream"),
        (status = 403, description = "URL is not on the storage allow-list", body = crate::error::ApiError),
        (status = 413, description = "Object exceeds the size cap", body = crate::error::ApiError),
        (status = 422, description = "Missing url or caller", body = crate::error::ApiError),
        (status = 429, description = "Download quota exhausted", body = crate::error::ApiError),
        (status = 502, description = "Storage returned an error", body = crate::error::ApiError),
        (status = 504, description = "Storage timed out", body = crate::error::ApiError)
    )
)]
pub async fn proxy_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Response {
    if let Err(e) = require_non_blank("url", &request.url)
        .and_then(|()| require_non_blank("callerIdentity", &request.caller_identity))
    {
        return e.into_response();
    }

    match state
        .manager
        .proxy_download(&request.url, &request.caller_identity)
        .await
    {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
