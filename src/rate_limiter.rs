//! Fixed-window quota tracking per identifier
//!
//! Identifiers are free-form strings; callers namespace them by operation
//! (`export:{caller}`, `fetch:{caller}`, `download:{caller}`). A window starts
//! on the first counted request and resets once it has elapsed.

use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

/// Counter for one identifier
#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    /// Requests counted in the current window
    count: u32,
    /// When the current window ends
    window_reset_at: Instant,
}

impl RateLimitEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_reset_at
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether another request fits in the window
    pub allowed: bool,
    /// Requests left in the window
    pub remaining: u32,
    /// When the window resets
    pub reset_at: Instant,
}

impl RateLimitStatus {
    /// Time until the window resets (zero if it already has)
    pub fn retry_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// [`retry_after`](Self::retry_after) rounded up to whole seconds, at least 1
    pub fn retry_after_secs(&self) -> u64 {
        let wait = self.retry_after();
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }

    fn from_count(count: u32, max_per_window: u32, reset_at: Instant) -> Self {
        Self {
            allowed: count < max_per_window,
            remaining: max_per_window.saturating_sub(count),
            reset_at,
        }
    }
}

/// Fixed-window rate limiter shared by every job and API request
///
/// All counters live behind one async mutex, so increments from concurrent
/// workers are serialized. Time comes from [`tokio::time::Instant`].
#[derive(Debug)]
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter with the given window length
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Window length of this limiter
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Report the quota state of `identifier` without counting a request
    ///
    /// Unknown or expired identifiers are reported as a fresh window.
    pub async fn check_limit(&self, identifier: &str, max_per_window: u32) -> RateLimitStatus {
        let now = Instant::now();
        let entries = self.entries.lock().await;

        match entries.get(identifier) {
            Some(entry) if !entry.is_expired(now) => {
                RateLimitStatus::from_count(entry.count, max_per_window, entry.window_reset_at)
            }
            _ => RateLimitStatus::from_count(0, max_per_window, now + self.window),
        }
    }

    /// Count one request for `identifier`, starting a new window if needed
    pub async fn increment(&self, identifier: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = self.current_entry(&mut entries, identifier, now);
        entry.count = entry.count.saturating_add(1);
    }

    /// Check and count in one step
    ///
    /// The request is only counted when it is allowed; the returned status
    /// describes the window after counting.
    pub async fn try_acquire(&self, identifier: &str, max_per_window: u32) -> RateLimitStatus {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = self.current_entry(&mut entries, identifier, now);

        if entry.count >= max_per_window {
            return RateLimitStatus::from_count(entry.count, max_per_window, entry.window_reset_at);
        }

        entry.count += 1;
        RateLimitStatus {
            allowed: true,
            remaining: max_per_window - entry.count,
            reset_at: entry.window_reset_at,
        }
    }

    /// Drop every entry whose window has elapsed, returning how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();

        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Swept expired rate limit windows");
        }
        removed
    }

    fn current_entry<'a>(
        &self,
        entries: &'a mut HashMap<String, RateLimitEntry>,
        identifier: &str,
        now: Instant,
    ) -> &'a mut RateLimitEntry {
        let fresh = RateLimitEntry {
            count: 0,
            window_reset_at: now + self.window,
        };
        let entry = entries.entry(identifier.to_string()).or_insert(fresh);
        if entry.is_expired(now) {
            *entry = fresh;
        }
        entry
    }
}

/// Quota key for export creations
pub(crate) fn export_key(caller: &str) -> String {
    format!("export:{caller}")
}

/// Quota key for item fetches performed by a caller's jobs
pub(crate) fn fetch_key(caller: &str) -> String {
    format!("fetch:{caller}")
}

/// Quota key for single-file proxy downloads
pub(crate) fn download_key(caller: &str) -> String {
    format!("download:{caller}")
}
