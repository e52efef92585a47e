//! Delivery dispatcher: fans a claimed batch out across a bounded worker
//! pool and writes outcomes back to the queue store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use opshub_core::config::NotifierConfig;
use opshub_entity::notification::{DeliveryStatus, NotificationRecord};

use crate::backoff::BackoffPolicy;
use crate::channel::{DeliveryChannel, DeliveryError};
use crate::store::QueueStore;

/// Fans claimed records out to delivery workers.
///
/// The pool size bounds concurrent delivery attempts independently of the
/// batch size, protecting the external channel from overload. A failing
/// record never affects siblings in the same batch: every outcome, including
/// write-back errors, is contained to its own worker task.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    channel: Arc<dyn DeliveryChannel>,
    backoff: BackoffPolicy,
    delivery_timeout: Duration,
    semaphore: Arc<Semaphore>,
    pool_size: usize,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(
        store: Arc<dyn QueueStore>,
        channel: Arc<dyn DeliveryChannel>,
        config: &NotifierConfig,
    ) -> Self {
        Self {
            store,
            channel,
            backoff: BackoffPolicy::from_config(config),
            delivery_timeout: Duration::from_millis(config.delivery_timeout_ms),
            semaphore: Arc::new(Semaphore::new(config.worker_pool_size)),
            pool_size: config.worker_pool_size,
        }
    }

    /// Fan a claimed batch out to the worker pool.
    ///
    /// Returns once every record has been handed to a worker; completions
    /// happen in the background and in no particular order.
    pub async fn dispatch_batch(self: &Arc<Self>, batch: Vec<NotificationRecord>) {
        for record in batch {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    tracing::error!("Worker pool semaphore closed, dropping dispatch");
                    return;
                }
            };

            let dispatcher = Arc::clone(self);
            tokio::spawn(async move {
                let _permit = permit;
                dispatcher.attempt_delivery(&record).await;
            });
        }
    }

    /// Perform one delivery attempt and write the outcome back.
    pub async fn attempt_delivery(&self, record: &NotificationRecord) {
        tracing::debug!(
            id = %record.id,
            channel = %record.channel,
            priority = record.priority,
            attempt = record.retry_count + 1,
            max_attempts = record.max_retries + 1,
            "Attempting delivery"
        );

        let outcome =
            tokio::time::timeout(self.delivery_timeout, self.channel.deliver(record)).await;

        match outcome {
            Ok(Ok(())) => match self.store.record_success(record.id).await {
                Ok(true) => tracing::info!(id = %record.id, "Notification delivered"),
                Ok(false) => tracing::debug!(id = %record.id, "Duplicate success write-back"),
                Err(e) => tracing::error!(id = %record.id, "Failed to record success: {e}"),
            },
            Ok(Err(DeliveryError::Permanent(reason))) => {
                tracing::warn!(id = %record.id, %reason, "Unrecoverable delivery failure");
                if let Err(e) = self.store.record_permanent_failure(record.id, &reason).await {
                    tracing::error!(id = %record.id, "Failed to record permanent failure: {e}");
                }
            }
            Ok(Err(DeliveryError::Transient(reason))) => {
                self.record_transient_failure(record, reason).await;
            }
            Err(_) => {
                let reason = format!(
                    "Delivery attempt timed out after {}ms",
                    self.delivery_timeout.as_millis()
                );
                self.record_transient_failure(record, reason).await;
            }
        }
    }

    async fn record_transient_failure(&self, record: &NotificationRecord, reason: String) {
        let next_retry_at = self
            .backoff
            .next_retry_at(record.retry_count as u32, Utc::now());

        match self
            .store
            .record_failure(record.id, &reason, next_retry_at)
            .await
        {
            Ok(Some(DeliveryStatus::Dead)) => {
                tracing::warn!(id = %record.id, %reason, "Retry budget exhausted, dead-lettered");
            }
            Ok(Some(_)) => {
                tracing::info!(
                    id = %record.id,
                    %reason,
                    retry_at = %next_retry_at,
                    "Transient delivery failure, retry scheduled"
                );
            }
            Ok(None) => {
                tracing::debug!(id = %record.id, "Duplicate failure write-back");
            }
            Err(e) => {
                tracing::error!(id = %record.id, "Failed to record delivery failure: {e}");
            }
        }
    }

    /// Wait until all in-flight workers have finished, up to `wait`.
    pub async fn drain(&self, wait: Duration) {
        let _ = tokio::time::timeout(
            wait,
            self.semaphore.acquire_many(self.pool_size as u32),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opshub_entity::notification::{ChannelKind, CreateNotification};
    use crate::store::MemoryQueueStore;

    /// Channel whose outcome is scripted by the recipient string.
    #[derive(Debug)]
    struct ScriptedChannel;

    #[async_trait]
    impl DeliveryChannel for ScriptedChannel {
        async fn deliver(&self, record: &NotificationRecord) -> Result<(), DeliveryError> {
            match record.recipient.as_str() {
                "transient" => Err(DeliveryError::Transient("smtp 421".to_string())),
                "permanent" => Err(DeliveryError::Permanent("unknown mailbox".to_string())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    fn test_config() -> NotifierConfig {
        NotifierConfig {
            worker_pool_size: 4,
            delivery_timeout_ms: 200,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            backoff_jitter: 0.0,
            ..NotifierConfig::default()
        }
    }

    fn setup() -> (Arc<MemoryQueueStore>, Arc<Dispatcher>) {
        let store = Arc::new(MemoryQueueStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store) as Arc<dyn QueueStore>,
            Arc::new(ScriptedChannel),
            &test_config(),
        ));
        (store, dispatcher)
    }

    async fn claimed(store: &MemoryQueueStore, recipient: &str) -> NotificationRecord {
        let rec = store.enqueue(CreateNotification {
            recipient: recipient.to_string(),
            channel: ChannelKind::Email,
            payload: serde_json::json!({"body": "hi"}),
            priority: 0,
            scheduled_for: None,
            max_retries: 3,
        });
        store.claim(&[rec.id]).await.unwrap();
        store.get(rec.id).unwrap()
    }

    #[tokio::test]
    async fn test_success_marks_sent() {
        let (store, dispatcher) = setup();
        let rec = claimed(&store, "ok").await;

        dispatcher.attempt_delivery(&rec).await;

        let snapshot = store.get(rec.id).unwrap();
        assert_eq!(snapshot.status, DeliveryStatus::Sent);
        assert!(snapshot.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_retry() {
        let (store, dispatcher) = setup();
        let rec = claimed(&store, "transient").await;
        let before = Utc::now();

        dispatcher.attempt_delivery(&rec).await;

        let snapshot = store.get(rec.id).unwrap();
        assert_eq!(snapshot.status, DeliveryStatus::FailedRetryable);
        assert_eq!(snapshot.retry_count, 1);
        assert!(snapshot.next_retry_at.unwrap() > before);
        assert!(snapshot.error_message.unwrap().contains("smtp 421"));
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_letters() {
        let (store, dispatcher) = setup();
        let rec = claimed(&store, "permanent").await;

        dispatcher.attempt_delivery(&rec).await;

        let snapshot = store.get(rec.id).unwrap();
        assert_eq!(snapshot.status, DeliveryStatus::Dead);
        assert!(snapshot.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_a_transient_failure() {
        let (store, dispatcher) = setup();
        let rec = claimed(&store, "slow").await;

        dispatcher.attempt_delivery(&rec).await;

        let snapshot = store.get(rec.id).unwrap();
        assert_eq!(snapshot.status, DeliveryStatus::FailedRetryable);
        assert!(snapshot.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_batch_failures_are_isolated() {
        let (store, dispatcher) = setup();
        let good_a = claimed(&store, "ok").await;
        let bad = claimed(&store, "transient").await;
        let good_b = claimed(&store, "ok").await;

        dispatcher
            .dispatch_batch(vec![good_a.clone(), bad.clone(), good_b.clone()])
            .await;
        dispatcher.drain(Duration::from_secs(5)).await;

        assert_eq!(store.get(good_a.id).unwrap().status, DeliveryStatus::Sent);
        assert_eq!(store.get(good_b.id).unwrap().status, DeliveryStatus::Sent);
        assert_eq!(
            store.get(bad.id).unwrap().status,
            DeliveryStatus::FailedRetryable
        );
    }
}
