use super::{ObjectStore, validate_path};
use crate::config::StorageConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Object store writing archives below a local directory
///
/// Download URLs are `{public_base_url}/{path}`; the API router can serve the
/// directory itself (see [`StorageConfig::serve_outputs`]).
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.output_dir, &config.public_base_url)
    }

    /// Root directory of the store
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        validate_path(path)?;

        let target = self.root.join(path);
        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            path: path.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }

        // Write then rename so a half-written archive is never served
        let partial = target.with_extension("zip.partial");
        tokio::fs::write(&partial, &bytes).await.map_err(write_failed)?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(write_failed)?;

        tracing::debug!(path, size = bytes.len(), "Stored archive");
        Ok(self.url_for(path))
    }

    async fn delete(&self, paths: &[String]) -> Result<(), StorageError> {
        let mut first_error = None;

        for path in paths {
            if let Err(e) = validate_path(path) {
                first_error.get_or_insert(e);
                continue;
            }

            let target = self.root.join(path);
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {
                    // Job directories only ever hold that job's shards
                    if let Some(parent) = target.parent() {
                        let _ = tokio::fs::remove_dir(parent).await;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to delete archive");
                    first_error.get_or_insert(StorageError::DeleteFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
