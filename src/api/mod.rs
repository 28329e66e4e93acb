//! REST API server module
//!
//! Exposes export job creation and polling, the download proxy, health,
//! the OpenAPI document and an SSE stream of audit events.

use crate::{ExportManager, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Exports
/// - `POST /export` - Start an export (`202` with the job id)
/// - `GET /export` - List jobs, optionally `?eventId=`
/// - `GET /export/:jobId` - Poll one job
///
/// ## Download proxy
/// - `POST /download` - Fetch one allow-listed object
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive documentation (if enabled)
/// - `GET /events` - Server-sent events stream
///
/// ## Files
/// - `GET /files/*` - Finished archives from the local output directory
///   (if `storage.serve_outputs` is set)
pub fn create_router(manager: ExportManager) -> Router {
    let state = AppState::new(manager);
    let config = state.config.clone();

    let router = Router::new()
        // Exports
        .route("/export", post(routes::create_export))
        .route("/export", get(routes::list_exports))
        .route("/export/:job_id", get(routes::get_export))
        // Download proxy
        .route("/download", post(routes::proxy_download))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Merge Swagger UI routes before applying state
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = if config.storage.serve_outputs {
        router.nest_service("/files", ServeDir::new(&config.storage.output_dir))
    } else {
        router
    };

    let router = router
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` anywhere in the list (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address
///
/// Runs until the server fails or the surrounding task is dropped. Combine
/// with [`crate::run_with_shutdown`] to drain running jobs on a signal.
///
/// # Example
///
/// ```no_run
/// use media_export::{Collaborators, Config, ExportManager, InMemoryCatalog};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let catalog = Arc::new(InMemoryCatalog::new());
/// let collaborators = Collaborators::from_config(&config, catalog.clone(), catalog)?;
/// let manager = ExportManager::new(config, collaborators)?;
///
/// media_export::api::start_api_server(manager).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(manager: ExportManager) -> Result<()> {
    let bind_address = manager.config().api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(manager);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
