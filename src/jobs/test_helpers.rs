//! Shared fixtures for manager, worker and API tests

use super::{Collaborators, ExportJob, ExportManager, MemoryJobRepository};
use crate::config::{Config, RetryConfig};
use crate::error::FetchError;
use crate::fetcher::{Fetch, FetchOptions};
use crate::store::{InMemoryCatalog, MemoryObjectStore};
use crate::types::{ExportItem, JobId, PlanTier};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

/// Origin every test item lives under
pub(crate) const MEDIA_ORIGIN: &str = "https://media.test";

/// Canned response for one URL
#[derive(Clone)]
pub(crate) enum StubResponse {
    Body(Vec<u8>),
    Fail(FetchError),
    Panic,
}

/// In-process [`Fetch`] double with per-URL responses
///
/// Unknown URLs answer with HTTP 404. With a gate, every fetch waits for a
/// permit first, which lets tests hold a job in `processing`.
#[derive(Default)]
pub(crate) struct StubFetch {
    responses: Mutex<HashMap<String, StubResponse>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl StubFetch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) async fn respond(&self, url: &str, response: StubResponse) {
        self.responses
            .lock()
            .await
            .insert(url.to_string(), response);
    }

    pub(crate) async fn serve_items(&self, items: &[ExportItem], size: usize) {
        for item in items {
            self.respond(
                &item.source_url,
                StubResponse::Body(vec![b'x'; size]),
            )
            .await;
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for StubFetch {
    async fn fetch(
        &self,
        url: &str,
        _options: &FetchOptions,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let response = self.responses.lock().await.get(url).cloned();
        match response {
            Some(StubResponse::Body(bytes)) => Ok(bytes),
            Some(StubResponse::Fail(e)) => Err(e),
            Some(StubResponse::Panic) => panic!("stub fetch asked to panic for {url}"),
            None => Err(FetchError::HttpError { status: 404 }),
        }
    }
}

/// Everything a test needs to drive and inspect a manager
pub(crate) struct Harness {
    pub manager: ExportManager,
    pub catalog: Arc<InMemoryCatalog>,
    pub store: Arc<MemoryObjectStore>,
    pub fetch: Arc<StubFetch>,
}

/// Config with instant retries and no fetch backoff
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.fetch.allowed_origins = vec![MEDIA_ORIGIN.to_string()];
    config.fetch.retry = instant_retry(1);
    config.rate_limit.backoff = instant_retry(0);
    config
}

pub(crate) fn instant_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}

pub(crate) fn create_test_manager_with(config: Config, fetch: StubFetch) -> Harness {
    let catalog = Arc::new(InMemoryCatalog::new());
    let store = Arc::new(MemoryObjectStore::new());
    let fetch = Arc::new(fetch);

    let collaborators = Collaborators {
        event_store: catalog.clone(),
        authorizer: catalog.clone(),
        object_store: store.clone(),
        fetcher: fetch.clone(),
        repository: Arc::new(MemoryJobRepository::new()),
    };
    let manager = ExportManager::new(config, collaborators).unwrap();

    Harness {
        manager,
        catalog,
        store,
        fetch,
    }
}

pub(crate) fn create_test_manager() -> Harness {
    create_test_manager_with(test_config(), StubFetch::new())
}

/// `count` items named "Photo {i}.jpg" under [`MEDIA_ORIGIN`]
pub(crate) fn items(count: usize) -> Vec<ExportItem> {
    (1..=count)
        .map(|i| {
            ExportItem::new(
                format!("p{i}"),
                format!("{MEDIA_ORIGIN}/photos/p{i}.jpg"),
                format!("Photo {i}.jpg"),
            )
        })
        .collect()
}

impl Harness {
    /// Register a premium event owned by "alice" whose items all resolve
    pub(crate) async fn premium_event(&self, event_id: &str, items: Vec<ExportItem>, size: usize) {
        self.fetch.serve_items(&items, size).await;
        self.catalog
            .insert_event(event_id, "alice", PlanTier::Premium, items)
            .await;
    }
}

/// Poll until the job is terminal
pub(crate) async fn wait_terminal(manager: &ExportManager, id: &JobId) -> ExportJob {
    for _ in 0..500 {
        let job = manager.get_job(id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish in time");
}
