//! # media-export
//!
//! Bulk export of an event's media into downloadable zip archives.
//!
//! ## Design Philosophy
//!
//! media-export is designed to be:
//! - **Bounded** - Every fetch has a timeout and a size cap, every archive a size cap
//! - **Asynchronous** - Creating an export returns a job id immediately; progress is polled
//! - **Forgiving** - A missing or broken item is recorded and skipped, not fatal
//! - **Pluggable** - Events, permissions, storage and fetching sit behind traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_export::{Collaborators, Config, ExportItem, ExportManager, InMemoryCatalog, PlanTier};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.fetch.allowed_origins = vec!["https://media.example.com".to_string()];
//!
//!     let catalog = Arc::new(InMemoryCatalog::new());
//!     catalog
//!         .insert_event(
//!             "evt-1",
//!             "alice",
//!             PlanTier::Premium,
//!             vec![ExportItem::new(
//!                 "p1",
//!                 "https://media.example.com/evt-1/p1.jpg",
//!                 "Beach.jpg",
//!             )],
//!         )
//!         .await;
//!
//!     let collaborators = Collaborators::from_config(&config, catalog.clone(), catalog)?;
//!     let manager = ExportManager::new(config, collaborators)?;
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let job_id = manager.create_job("evt-1", "alice").await?;
//!     println!("{:?}", manager.job_view(&job_id).await?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Zip archive assembly
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Allow-listed object fetching
pub mod fetcher;
/// Export jobs: model, storage and background execution
pub mod jobs;
/// Fixed-window rate limiting
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Collaborator traits and shipped implementations
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, ArchiveError, Error, ErrorDetail, FetchError, JobError, Result, StorageError,
    ToHttpStatus,
};
pub use fetcher::{AllowList, Fetch, FetchOptions, HttpFetcher};
pub use jobs::{Collaborators, ExportJob, ExportManager, JobRepository, MemoryJobRepository};
pub use store::{
    Authorizer, EventStore, InMemoryCatalog, LocalObjectStore, MemoryObjectStore, ObjectStore,
};
pub use types::{
    ArchiveOutput, Event, ExportItem, FailedItem, JobId, JobStatus, JobView, PlanTier,
};

/// Helper function to run the manager with graceful signal handling.
///
/// Waits for a termination signal and then calls the manager's `shutdown()` method,
/// which stops intake and waits for running jobs.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_export::{Collaborators, Config, ExportManager, InMemoryCatalog, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let catalog = Arc::new(InMemoryCatalog::new());
///     let collaborators = Collaborators::from_config(&config, catalog.clone(), catalog)?;
///     let manager = ExportManager::new(config, collaborators)?;
///
///     run_with_shutdown(manager).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: ExportManager) {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
