//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time with utoipa.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-export REST API
///
/// Served at `/openapi.json` and, when enabled, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-export REST API",
        version = "0.1.0",
        description = "Bulk export of event media into sharded zip archives, with pollable jobs and a single-file download proxy",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Exports
        crate::api::routes::create_export,
        crate::api::routes::get_export,
        crate::api::routes::list_exports,

        // Download proxy
        crate::api::routes::proxy_download,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::JobView,
        crate::types::ArchiveOutput,
        crate::types::FailedItem,
        crate::types::ExportItem,
        crate::types::PlanTier,
        crate::types::Event,

        // Config types from config.rs
        crate::config::Config,
        crate::config::FetchConfig,
        crate::config::ArchiveConfig,
        crate::config::Compression,
        crate::config::JobConfig,
        crate::config::RateLimitConfig,
        crate::config::RetryConfig,
        crate::config::ApiConfig,
        crate::config::StorageConfig,

        // Request/response types from routes
        crate::api::routes::CreateExportRequest,
        crate::api::routes::CreateExportResponse,
        crate::api::routes::DownloadRequest,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "exports", description = "Export jobs - Start bulk exports and poll their progress"),
        (name = "download", description = "Download proxy - Fetch a single object from allowed storage"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
