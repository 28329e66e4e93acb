//! REST API server example
//!
//! Runs media-export with an in-memory event catalog and archives written to
//! `./exports`, allowing control via HTTP endpoints.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Start an export via POST http://localhost:6790/export
//! - Poll it via GET http://localhost:6790/export/{jobId}
//! - Stream events via GET http://localhost:6790/events
//!
//! Set `MEDIA_ORIGIN` to the storage origin holding the demo items
//! (default `http://localhost:8000`) and `RUST_LOG` to tune logging.

use media_export::api::start_api_server;
use media_export::{
    Collaborators, Config, ExportItem, ExportManager, InMemoryCatalog, PlanTier, run_with_shutdown,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("media_export=debug,tower_http=info")),
        )
        .init();

    let origin =
        std::env::var("MEDIA_ORIGIN").unwrap_or_else(|_| "http://localhost:8000".to_string());

    let mut config = Config::default();
    config.fetch.allowed_origins = vec![origin.clone()];

    // One premium event owned by "alice" with a few photos
    let catalog = Arc::new(InMemoryCatalog::new());
    let items = (1..=5)
        .map(|i| {
            ExportItem::new(
                format!("photo-{i}"),
                format!("{origin}/demo/photo-{i}.jpg"),
                format!("Photo {i}.jpg"),
            )
        })
        .collect();
    catalog
        .insert_event("demo-event", "alice", PlanTier::Premium, items)
        .await;

    let collaborators = Collaborators::from_config(&config, catalog.clone(), catalog)?;
    let manager = ExportManager::new(config, collaborators)?;
    let maintenance = manager.start_maintenance();

    println!("Starting media-export REST API server");
    println!("Swagger UI: http://localhost:6790/swagger-ui");
    println!("Events stream: http://localhost:6790/events");
    println!();
    println!("Example commands:");
    println!("  curl -X POST http://localhost:6790/export \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"eventId\": \"demo-event\", \"callerIdentity\": \"alice\"}}'");
    println!();
    println!("  curl http://localhost:6790/export/<jobId>");

    let server = tokio::spawn(start_api_server(manager.clone()));

    run_with_shutdown(manager).await;
    server.abort();
    maintenance.await?;

    Ok(())
}
