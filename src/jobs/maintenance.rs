//! Periodic cleanup of expired jobs and stale quota windows

use super::manager::ExportManager;
use crate::error::Result;
use crate::types::Event;
use chrono::Utc;

impl ExportManager {
    /// Remove expired terminal jobs and delete their archives
    ///
    /// Archive deletion failures are logged and do not keep the job around.
    /// Returns the number of removed jobs.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let expired = self
            .collaborators
            .repository
            .remove_expired(Utc::now())
            .await?;

        for job in &expired {
            let paths = job.output_paths();
            if !paths.is_empty() {
                if let Err(e) = self.collaborators.object_store.delete(&paths).await {
                    tracing::warn!(
                        job_id = %job.id,
                        error = %e,
                        "Failed to delete archives of expired export job"
                    );
                }
            }

            tracing::info!(
                job_id = %job.id,
                event_id = %job.event_id,
                archives = paths.len(),
                "Expired export job removed"
            );
            self.emit(Event::ExportExpired {
                job_id: job.id.clone(),
                event_id: job.event_id.clone(),
            });
        }

        Ok(expired.len())
    }

    /// Start the maintenance task
    ///
    /// Every `jobs.cleanup_interval` the task removes expired jobs and sweeps
    /// expired rate limit windows. It stops on [`shutdown`](Self::shutdown).
    pub fn start_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let cancel_token = self.maintenance_token.clone();
        let period = self.config.jobs.cleanup_interval;

        tracing::info!(interval_secs = period.as_secs(), "Maintenance task started");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match manager.cleanup_expired().await {
                            Ok(removed) if removed > 0 => {
                                tracing::debug!(removed, "Expired export jobs cleaned up");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(error = %e, "Expired job cleanup failed");
                            }
                        }
                        manager.limiter.sweep_expired().await;
                    }
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("Maintenance task stopped");
                        break;
                    }
                }
            }
        })
    }
}
