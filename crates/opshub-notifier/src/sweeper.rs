//! Retention sweeper: periodically purges old terminal records and
//! recovers stale claims.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use opshub_core::config::NotifierConfig;
use opshub_entity::notification::DeliveryStatus;

use crate::store::QueueStore;

/// Statuses the sweeper is allowed to delete.
const TERMINAL_STATUSES: [DeliveryStatus; 2] = [DeliveryStatus::Sent, DeliveryStatus::Dead];

/// Deletes terminal records past the retention window on an independent
/// cadence, in bounded batches, and releases claims left behind by crashed
/// workers. Never touches pending or retryable records.
#[derive(Debug)]
pub struct RetentionSweeper {
    store: Arc<dyn QueueStore>,
    config: NotifierConfig,
}

impl RetentionSweeper {
    /// Create a new retention sweeper.
    pub fn new(store: Arc<dyn QueueStore>, config: NotifierConfig) -> Self {
        Self { store, config }
    }

    /// Run until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            retention_days = self.config.retention_days,
            sweep_interval_seconds = self.config.sweep_interval_seconds,
            "Retention sweeper started"
        );

        let mut interval =
            time::interval(Duration::from_secs(self.config.sweep_interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("Retention sweeper received shutdown signal");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        tracing::info!("Retention sweeper shut down");
    }

    /// Execute one sweep: batched purge of old terminal records, then stale
    /// claim recovery. Returns the total number of records purged.
    pub async fn sweep(&self) -> u64 {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let batch_size = self.config.purge_batch_size as i64;

        let mut purged: u64 = 0;
        loop {
            match self
                .store
                .purge_older_than(&TERMINAL_STATUSES, cutoff, batch_size)
                .await
            {
                Ok(removed) => {
                    purged += removed;
                    if removed < batch_size as u64 {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Retention purge failed: {e}");
                    break;
                }
            }
        }

        if purged > 0 {
            tracing::info!(purged, cutoff = %cutoff, "Purged old terminal notifications");
        }

        let lease_cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.claim_lease_seconds as i64);
        match self.store.release_stale_claims(lease_cutoff).await {
            Ok(0) => {}
            Ok(released) => {
                tracing::warn!(released, "Released stale delivery claims back to pending");
            }
            Err(e) => {
                tracing::error!("Stale claim release failed: {e}");
            }
        }

        purged
    }
}
