//! HTTP error response handling for the API
//!
//! Domain errors become JSON error bodies with the status code from
//! [`ToHttpStatus`]. Rate limited responses also carry `Retry-After`.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let retry_after = match &self {
            Error::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        };

        if status_code.is_server_error() {
            tracing::error!(error = %self, status = status_code.as_u16(), "Request failed");
        }

        let api_error: ApiError = self.into();
        let mut response = (status_code, Json(api_error)).into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Errors with a known status go through Error::into_response
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
