//! Bounded object fetching from allow-listed storage origins
//!
//! Every remote read in the crate goes through [`Fetch`]: export workers use it
//! per item and the single-file download proxy uses it per request. URLs are
//! checked against an [`AllowList`] before any network activity, the whole
//! request is bounded by a timeout, and bodies are read chunk by chunk so an
//! oversized object is abandoned as soon as it crosses the cap.

use crate::config::{FetchConfig, RetryConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed per fetch
const MAX_REDIRECTS: usize = 5;

/// Per-fetch limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Hard timeout over request and body
    pub timeout: Duration,
    /// Maximum body size in bytes
    pub max_bytes: u64,
}

impl From<&FetchConfig> for FetchOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_bytes: config.max_file_bytes,
        }
    }
}

/// Source of object bytes
///
/// [`HttpFetcher`] is the production implementation; tests drive workers with
/// in-process doubles.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch the full body at `url` within `options`
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Fetch with transient-failure retries
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    url: &str,
    options: &FetchOptions,
    retry: &RetryConfig,
) -> std::result::Result<Vec<u8>, FetchError> {
    with_retry(retry, move || fetcher.fetch(url, options)).await
}

/// One allowed storage origin with an optional path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
struct AllowedOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
    /// Path prefix without trailing slash ("" allows every path)
    path_prefix: String,
}

impl AllowedOrigin {
    fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if !is_http(&url) || has_userinfo(&url) || url.query().is_some() {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();

        Some(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port_or_known_default(),
            path_prefix: url.path().trim_end_matches('/').to_string(),
        })
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        if url.scheme() != self.scheme
            || !host.eq_ignore_ascii_case(&self.host)
            || url.port_or_known_default() != self.port
        {
            return false;
        }

        if self.path_prefix.is_empty() {
            return true;
        }
        let path = url.path();
        path == self.path_prefix
            || path
                .strip_prefix(&self.path_prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn has_userinfo(url: &Url) -> bool {
    !url.username().is_empty() || url.password().is_some()
}

/// Storage origins objects may be fetched from
///
/// Matching is done on the parsed URL (scheme, host, port and whole path
/// segments), never on the raw string, so look-alike hosts and URLs that
/// merely mention an allowed origin in their query are rejected. URLs with
/// embedded credentials are always rejected. An empty list rejects everything.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    origins: Vec<AllowedOrigin>,
}

impl AllowList {
    /// Parse configured origins
    pub fn from_origins<S: AsRef<str>>(origins: &[S]) -> Result<Self> {
        let origins = origins
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                AllowedOrigin::parse(raw).ok_or_else(|| Error::Config {
                    message: format!("invalid allowed origin '{raw}': expected an http(s) URL"),
                    key: Some("fetch.allowed_origins".to_string()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { origins })
    }

    /// Whether no origin is configured
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Whether a parsed URL is allowed
    pub fn is_allowed(&self, url: &Url) -> bool {
        is_http(url) && !has_userinfo(url) && self.origins.iter().any(|o| o.matches(url))
    }

    /// Parse and check a raw URL
    pub fn check(&self, raw: &str) -> std::result::Result<Url, FetchError> {
        match Url::parse(raw) {
            Ok(url) if self.is_allowed(&url) => Ok(url),
            _ => Err(FetchError::NotAllowed {
                url: raw.to_string(),
            }),
        }
    }
}

/// HTTP implementation of [`Fetch`] over one shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    allow_list: AllowList,
}

impl HttpFetcher {
    /// Build a fetcher whose redirects are re-checked against `allow_list`
    pub fn new(allow_list: AllowList) -> Result<Self> {
        let redirect_allow_list = allow_list.clone();
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if redirect_allow_list.is_allowed(attempt.url()) {
                attempt.follow()
            } else {
                // Surfaces as a 3xx response, reported as NotAllowed below
                attempt.stop()
            }
        });

        let client = reqwest::Client::builder()
            .redirect(policy)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, allow_list })
    }

    /// The allow-list this fetcher enforces
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    async fn fetch_unbounded(
        &self,
        url: Url,
        max_bytes: u64,
        timeout_ms: u64,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(FetchError::NotAllowed { url: location });
        }
        if !status.is_success() {
            return Err(FetchError::HttpError {
                status: status.as_u16(),
            });
        }

        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchError::TooLarge { max_bytes });
        }

        let capacity = response.content_length().unwrap_or(0).min(max_bytes);
        let mut body = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify(e, timeout_ms))?
        {
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge { max_bytes });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let parsed = self.allow_list.check(url)?;
        let timeout_ms = u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX);

        match tokio::time::timeout(
            options.timeout,
            self.fetch_unbounded(parsed, options.max_bytes, timeout_ms),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout { timeout_ms }),
        }
    }
}

fn classify(e: reqwest::Error, timeout_ms: u64) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout { timeout_ms }
    } else if e.is_redirect() {
        // Hop limit reached; the same URL would loop again on retry
        FetchError::NotAllowed {
            url: e.url().map(|u| u.to_string()).unwrap_or_default(),
        }
    } else if e.is_connect() {
        FetchError::NetworkError(format!("connection failed: {e}"))
    } else {
        FetchError::NetworkError(e.to_string())
    }
}
