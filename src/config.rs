//! Configuration types for media-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for [`ExportManager`](crate::ExportManager)
///
/// Every section falls back to its defaults when omitted, so an empty JSON
/// object is a valid configuration. Note that the default fetch allow-list is
/// empty, which rejects every fetch until storage origins are configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Object fetching (allow-list, timeout, per-file cap, retries)
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Archive assembly (size cap, compression)
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Job limits, retention and shutdown behavior
    #[serde(default)]
    pub jobs: JobConfig,

    /// Per-caller quotas
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// REST API server
    #[serde(default)]
    pub api: ApiConfig,

    /// Local archive storage
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express
    ///
    /// Called by [`ExportManager::new`](crate::ExportManager::new); invalid
    /// configurations never reach a running manager.
    pub fn validate(&self) -> Result<()> {
        if self.archive.max_archive_bytes == 0 {
            return Err(config_error(
                "maximum archive size must be greater than zero",
                "archive.max_archive_bytes",
            ));
        }

        if self.fetch.max_file_bytes == 0 {
            return Err(config_error(
                "maximum file size must be greater than zero",
                "fetch.max_file_bytes",
            ));
        }

        if self.fetch.max_file_bytes > self.archive.max_archive_bytes {
            return Err(config_error(
                format!(
                    "maximum file size ({} bytes) exceeds the maximum archive size ({} bytes)",
                    self.fetch.max_file_bytes, self.archive.max_archive_bytes
                ),
                "fetch.max_file_bytes",
            ));
        }

        if self.fetch.timeout.is_zero() {
            return Err(config_error(
                "fetch timeout must be greater than zero",
                "fetch.timeout",
            ));
        }

        if let Some(level) = self.archive.compression_level {
            if !(0..=9).contains(&level) {
                return Err(config_error(
                    format!("compression level {level} is outside 0-9"),
                    "archive.compression_level",
                ));
            }
        }

        if self.jobs.max_items_per_job == 0 {
            return Err(config_error(
                "maximum items per job must be greater than zero",
                "jobs.max_items_per_job",
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(config_error(
                "rate limit window must be greater than zero",
                "rate_limit.window",
            ));
        }

        crate::fetcher::AllowList::from_origins(&self.fetch.allowed_origins)?;

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Object fetching configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Storage origins items may be fetched from (default: none)
    ///
    /// Each entry is a URL such as `https://media.example.com` or
    /// `https://cdn.example.com/events/`. A fetch URL is allowed when its
    /// scheme, host and port match an entry and its path starts with the
    /// entry's path.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Hard timeout for one fetch, request and body (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Maximum size of a single fetched object in bytes (default: 100 MiB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Retry policy for transient fetch failures (default: 2 retries)
    #[serde(default = "default_fetch_retry")]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            timeout: default_fetch_timeout(),
            max_file_bytes: default_max_file_bytes(),
            retry: default_fetch_retry(),
        }
    }
}

/// Zip entry compression
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store entries without compression
    Stored,
    /// Deflate entries (default)
    #[default]
    Deflated,
}

/// Archive assembly configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchiveConfig {
    /// Maximum sum of raw entry sizes per archive shard (default: 500 MiB)
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Entry compression (default: deflated)
    #[serde(default)]
    pub compression: Compression,

    /// Deflate level 0-9 (default: 6, ignored for stored entries)
    #[serde(default = "default_compression_level")]
    pub compression_level: Option<i32>,

    /// Maximum entry name length in characters (default: 200)
    #[serde(default = "default_max_entry_name_len")]
    pub max_entry_name_len: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: default_max_archive_bytes(),
            compression: Compression::default(),
            compression_level: default_compression_level(),
            max_entry_name_len: default_max_entry_name_len(),
        }
    }
}

/// Export job configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobConfig {
    /// Maximum number of items in one export (default: 1000)
    #[serde(default = "default_max_items_per_job")]
    pub max_items_per_job: usize,

    /// How long finished jobs and their archives are kept (default: 48 hours)
    #[serde(default = "default_job_retention", with = "duration_serde")]
    pub job_retention: Duration,

    /// Reject a new export while one is pending or processing for the same event (default: true)
    #[serde(default = "default_true")]
    pub one_active_job_per_event: bool,

    /// Interval of the maintenance task (default: 1 hour)
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,

    /// How long shutdown waits for running jobs (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_items_per_job: default_max_items_per_job(),
            job_retention: default_job_retention(),
            one_active_job_per_event: true,
            cleanup_interval: default_cleanup_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Per-caller quota configuration
///
/// All quotas share one fixed window. Keys are namespaced per operation:
/// `export:{caller}`, `fetch:{caller}` and `download:{caller}`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitConfig {
    /// Window length (default: 1 hour)
    #[serde(default = "default_window", with = "duration_serde")]
    pub window: Duration,

    /// Export jobs a caller may create per window (default: 10)
    #[serde(default = "default_max_exports")]
    pub max_exports_per_window: u32,

    /// Item fetches a caller's jobs may perform per window (default: 1000)
    #[serde(default = "default_max_fetches")]
    pub max_fetches_per_window: u32,

    /// Single-file proxy downloads per caller per window (default: 100)
    #[serde(default = "default_max_downloads")]
    pub max_downloads_per_window: u32,

    /// Backoff used by workers when the fetch quota is exhausted (default: 3 attempts)
    #[serde(default = "default_backoff")]
    pub backoff: RetryConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_exports_per_window: default_max_exports(),
            max_fetches_per_window: default_max_fetches(),
            max_downloads_per_window: default_max_downloads(),
            backoff: default_backoff(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Local archive storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Directory archives are written to (default: "./exports")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Base URL archive download links are built from (default: "http://localhost:6790/files")
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Serve `output_dir` under `/files` from the API router (default: true)
    #[serde(default = "default_true")]
    pub serve_outputs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            public_base_url: default_public_base_url(),
            serve_outputs: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_file_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_fetch_retry() -> RetryConfig {
    RetryConfig::default()
}

fn default_max_archive_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_compression_level() -> Option<i32> {
    Some(6)
}

fn default_max_entry_name_len() -> usize {
    200
}

fn default_max_items_per_job() -> usize {
    1000
}

fn default_job_retention() -> Duration {
    Duration::from_secs(48 * 60 * 60)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_window() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_max_exports() -> u32 {
    10
}

fn default_max_fetches() -> u32 {
    1000
}

fn default_max_downloads() -> u32 {
    100
}

fn default_backoff() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        max_delay: Duration::from_secs(30),
        ..RetryConfig::default()
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_public_base_url() -> String {
    "http://localhost:6790/files".to_string()
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
