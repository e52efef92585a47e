//! Delivery runner: the scheduler loop that selects, claims, and dispatches
//! eligible notifications on a fixed timer tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use opshub_core::config::NotifierConfig;

use crate::dispatcher::Dispatcher;
use crate::store::QueueStore;

/// Polls the queue store on a fixed interval and dispatches claimed work.
///
/// Multiple runner instances (in one process or across processes) can
/// operate on the same store: the claim operation is the serialization
/// point, so overlapping selections resolve to disjoint claimed sets.
#[derive(Debug)]
pub struct DeliveryRunner {
    store: Arc<dyn QueueStore>,
    dispatcher: Arc<Dispatcher>,
    config: NotifierConfig,
}

impl DeliveryRunner {
    /// Create a new delivery runner.
    pub fn new(
        store: Arc<dyn QueueStore>,
        dispatcher: Arc<Dispatcher>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Run until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.batch_size,
            worker_pool_size = self.config.worker_pool_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "Delivery runner started"
        );

        let mut interval = time::interval(Duration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("Delivery runner received shutdown signal");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Delivery runner waiting for in-flight deliveries...");
        self.dispatcher.drain(Duration::from_secs(30)).await;
        tracing::info!("Delivery runner shut down");
    }

    /// Execute one scheduling tick: select eligible work, claim it, and hand
    /// the claimed records to the worker pool.
    ///
    /// A store failure aborts only this tick; the next tick starts fresh.
    /// Returns the number of records dispatched.
    pub async fn tick(&self) -> usize {
        let batch = match self.store.select_eligible(self.config.batch_size as i64).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Failed to select eligible notifications: {e}");
                return 0;
            }
        };

        if batch.is_empty() {
            tracing::trace!("No eligible notifications");
            return 0;
        }

        let ids: Vec<_> = batch.iter().map(|r| r.id).collect();
        let claimed_ids = match self.store.claim(&ids).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!("Failed to claim notifications: {e}");
                return 0;
            }
        };

        // Ids lost to a concurrent scheduler are skipped silently.
        let claimed: Vec<_> = batch
            .into_iter()
            .filter(|r| claimed_ids.contains(&r.id))
            .collect();

        tracing::debug!(
            selected = ids.len(),
            claimed = claimed.len(),
            "Dispatching claimed batch"
        );

        let count = claimed.len();
        self.dispatcher.dispatch_batch(claimed).await;
        count
    }
}
