//! Common test utilities for media-export integration tests
//!
//! Every test gets its own wiremock storage server, an output directory and
//! a manager wired with the real HTTP fetcher and local object store.

#![allow(dead_code)]

use media_export::config::RetryConfig;
use media_export::{
    Collaborators, Config, ExportItem, ExportJob, ExportManager, InMemoryCatalog, JobId, PlanTier,
};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Public base URL the local object store hands out
pub const FILES_BASE_URL: &str = "http://files.test";

/// Owner of every event created by [`TestEnv::premium_event`]
pub const OWNER: &str = "alice";

pub struct TestEnv {
    pub manager: ExportManager,
    pub catalog: Arc<InMemoryCatalog>,
    pub server: MockServer,
    pub output: TempDir,
}

/// Retry policy without real waiting
pub fn instant_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}

/// Start a storage server and build a manager around it
///
/// Only paths under `/media` on the server are allow-listed.
pub async fn start_env(configure: impl FnOnce(&mut Config)) -> TestEnv {
    let server = MockServer::start().await;
    let output = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.fetch.allowed_origins = vec![format!("{}/media", server.uri())];
    config.fetch.timeout = Duration::from_secs(5);
    config.fetch.retry = instant_retry(1);
    config.rate_limit.backoff = instant_retry(0);
    config.storage.output_dir = output.path().to_path_buf();
    config.storage.public_base_url = FILES_BASE_URL.to_string();
    configure(&mut config);

    let catalog = Arc::new(InMemoryCatalog::new());
    let collaborators = Collaborators::from_config(&config, catalog.clone(), catalog.clone()).unwrap();
    let manager = ExportManager::new(config, collaborators).unwrap();

    TestEnv {
        manager,
        catalog,
        server,
        output,
    }
}

impl TestEnv {
    /// URL of `rel` on the storage server
    pub fn url(&self, rel: &str) -> String {
        format!("{}{rel}", self.server.uri())
    }

    /// Serve `body` at `rel`
    pub async fn serve(&self, rel: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(rel))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// Register a premium event owned by [`OWNER`]
    pub async fn premium_event(&self, event_id: &str, items: Vec<ExportItem>) {
        self.catalog
            .insert_event(event_id, OWNER, PlanTier::Premium, items)
            .await;
    }

    /// `count` served photos of `size` bytes under `/media/{event_id}/`
    pub async fn photos(&self, event_id: &str, count: usize, size: usize) -> Vec<ExportItem> {
        let mut items = Vec::with_capacity(count);
        for i in 1..=count {
            let rel = format!("/media/{event_id}/p{i}.jpg");
            self.serve(&rel, vec![i as u8; size]).await;
            items.push(ExportItem::new(
                format!("p{i}"),
                self.url(&rel),
                format!("Photo {i}.jpg"),
            ));
        }
        items
    }

    /// Read a stored archive back from the output directory
    pub fn read_archive(&self, relative_path: &str) -> Vec<(String, Vec<u8>)> {
        read_zip(&self.output.path().join(relative_path))
    }
}

/// Poll until the job is terminal
pub async fn wait_for_terminal(manager: &ExportManager, id: &JobId) -> ExportJob {
    for _ in 0..1000 {
        let job = manager.get_job(id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish in time");
}

/// Entry names and contents of a zip file, in archive order
pub fn read_zip(file: &Path) -> Vec<(String, Vec<u8>)> {
    let bytes = std::fs::read(file).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (entry.name().to_string(), data)
        })
        .collect()
}
