//! Background sweep of expired anonymous galleries.
//!
//! The first sweep runs as soon as the task starts, then once per interval.
//! Each sweep runs in its own task so a panic is reported and the next tick
//! still happens.

use crate::services::gallery_service::{GalleryRef, GalleryResult, GalleryService};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct CleanupScheduler {
    service: GalleryService,
    interval: Duration,
    cancel: CancellationToken,
}

impl CleanupScheduler {
    pub fn new(service: GalleryService, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            service,
            interval,
            cancel,
        }
    }

    /// Start the periodic sweep. Stops once `cancel` fires, after finishing
    /// the gallery it is working on.
    pub fn spawn(
        service: GalleryService,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let scheduler = Self::new(service, interval, cancel);
        tokio::spawn(async move { scheduler.run().await })
    }

    async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "cleanup scheduler started");

        loop {
            let scheduler = self.clone();
            match tokio::spawn(async move { scheduler.sweep_once().await }).await {
                Ok(Ok(report)) if report.examined > 0 => {
                    info!(
                        examined = report.examined,
                        deleted = report.deleted,
                        failed = report.failed,
                        "cleanup sweep finished"
                    );
                }
                Ok(Ok(_)) => debug!("cleanup sweep found no expired galleries"),
                Ok(Err(err)) => error!(error = %err, "cleanup sweep failed"),
                Err(err) => error!(error = %err, "cleanup sweep aborted"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("cleanup scheduler stopped");
    }

    /// Delete every anonymous gallery expired as of now. One gallery failing
    /// does not stop the rest.
    pub async fn sweep_once(&self) -> GalleryResult<SweepReport> {
        let expired = self.service.expired_anonymous().await?;
        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        for gallery in expired {
            if self.cancel.is_cancelled() {
                warn!(remaining = report.examined - report.deleted - report.failed, "cleanup sweep interrupted");
                break;
            }
            let gallery_id = gallery.id;
            match self
                .service
                .delete_gallery(&GalleryRef::Anonymous(gallery))
                .await
            {
                Ok(()) => {
                    info!(gallery_id = %gallery_id, "deleted expired anonymous gallery");
                    report.deleted += 1;
                }
                Err(err) => {
                    error!(gallery_id = %gallery_id, error = %err, "failed to delete expired gallery");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
