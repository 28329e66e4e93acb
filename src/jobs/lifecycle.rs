//! Shutdown coordination.

use super::manager::ExportManager;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// How often shutdown re-checks the running jobs
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl ExportManager {
    /// Gracefully shut down the manager
    ///
    /// 1. Stops accepting new jobs ([`create_job`](Self::create_job) returns `ShuttingDown`)
    /// 2. Stops the maintenance task
    /// 3. Waits for running jobs to finish, up to `jobs.shutdown_timeout`
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Running jobs are never interrupted; a job still running at the timeout
    /// keeps running in the background until the runtime stops.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new export jobs");

        self.maintenance_token.cancel();

        let shutdown_timeout = self.config.jobs.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running export jobs finished"),
            Err(_) => {
                let remaining = self.active_jobs.lock().await.len();
                tracing::warn!(
                    remaining,
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Timeout waiting for export jobs, proceeding with shutdown"
                );
            }
        }

        self.emit(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
    }

    /// Number of jobs whose worker has not finished
    pub async fn active_job_count(&self) -> usize {
        self.active_jobs.lock().await.len()
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for export jobs to finish");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}
