//! Collaborator boundaries of the export pipeline
//!
//! The pipeline never talks to a database or a bucket directly. It asks an
//! [`EventStore`] for an event's plan tier and items, an [`Authorizer`]
//! whether a caller may export, and an [`ObjectStore`] to persist finished
//! archives. Shipped implementations:
//!
//! - [`LocalObjectStore`]: archives on the local filesystem
//! - [`MemoryObjectStore`]: archives in memory (tests, embedding)
//! - [`InMemoryCatalog`]: events, owners and items in memory

use crate::error::{Result, StorageError};
use crate::types::{ExportItem, PlanTier};
use async_trait::async_trait;

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::{InMemoryCatalog, MemoryObjectStore};

/// Destination for finished archives
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist `bytes` at the relative `path`, returning its public download URL
    async fn put(&self, path: &str, bytes: Vec<u8>)
    -> std::result::Result<String, StorageError>;

    /// Delete stored objects; missing paths are not an error
    async fn delete(&self, paths: &[String]) -> std::result::Result<(), StorageError>;
}

/// Read access to events and their media
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Plan tier of the event, `None` if the event does not exist
    async fn plan_tier(&self, event_id: &str) -> Result<Option<PlanTier>>;

    /// Items of the event in export order
    async fn items_for_event(&self, event_id: &str) -> Result<Vec<ExportItem>>;
}

/// Export permission check
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether `caller` may export `event_id`
    async fn can_export(&self, caller: &str, event_id: &str) -> Result<bool>;
}

/// Reject storage paths that could escape the store root
///
/// Paths are relative, `/`-separated, and contain no empty, `.` or `..`
/// segments.
pub(crate) fn validate_path(path: &str) -> std::result::Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') {
        return Err(invalid("path must be relative"));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(invalid("path contains a forbidden character"));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("path contains an empty or relative segment"));
    }
    Ok(())
}
