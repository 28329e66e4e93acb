use super::{Authorizer, EventStore, ObjectStore, validate_path};
use crate::error::{Result, StorageError};
use crate::types::{ExportItem, PlanTier};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Object store keeping archives in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    /// Puts still allowed through while `fail_puts` is set
    puts_left: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored at `path`
    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).cloned()
    }

    /// Sorted list of stored paths
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Make every subsequent `put` fail (simulates an unavailable bucket)
    pub fn set_fail_puts(&self, fail: bool) {
        self.puts_left.store(0, Ordering::SeqCst);
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Let `successful` more puts succeed, then fail every later one
    pub fn fail_puts_after(&self, successful: usize) {
        self.puts_left.store(successful, Ordering::SeqCst);
        self.fail_puts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<String, StorageError> {
        validate_path(path)?;
        if self.fail_puts.load(Ordering::SeqCst)
            && self
                .puts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        {
            return Err(StorageError::WriteFailed {
                path: path.to_string(),
                reason: "store unavailable".to_string(),
            });
        }

        self.objects.write().await.insert(path.to_string(), bytes);
        Ok(format!("memory://{path}"))
    }

    async fn delete(&self, paths: &[String]) -> std::result::Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }
}

/// One event known to [`InMemoryCatalog`]
#[derive(Debug, Clone)]
struct EventRecord {
    owner: String,
    tier: PlanTier,
    items: Vec<ExportItem>,
}

/// In-memory event catalog
///
/// Serves as both [`EventStore`] and [`Authorizer`]: only an event's owner
/// may export it.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    events: RwLock<HashMap<String, EventRecord>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an event
    pub async fn insert_event(
        &self,
        event_id: impl Into<String>,
        owner: impl Into<String>,
        tier: PlanTier,
        items: Vec<ExportItem>,
    ) {
        self.events.write().await.insert(
            event_id.into(),
            EventRecord {
                owner: owner.into(),
                tier,
                items,
            },
        );
    }

    /// Remove an event, returning whether it existed
    pub async fn remove_event(&self, event_id: &str) -> bool {
        self.events.write().await.remove(event_id).is_some()
    }
}

#[async_trait]
impl EventStore for InMemoryCatalog {
    async fn plan_tier(&self, event_id: &str) -> Result<Option<PlanTier>> {
        Ok(self.events.read().await.get(event_id).map(|e| e.tier))
    }

    async fn items_for_event(&self, event_id: &str) -> Result<Vec<ExportItem>> {
        Ok(self
            .events
            .read()
            .await
            .get(event_id)
            .map(|e| e.items.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Authorizer for InMemoryCatalog {
    async fn can_export(&self, caller: &str, event_id: &str) -> Result<bool> {
        Ok(self
            .events
            .read()
            .await
            .get(event_id)
            .is_some_and(|e| e.owner == caller))
    }
}
