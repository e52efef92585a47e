//! In-memory queue store.
//!
//! Honors the same contract as the Postgres repository, with the mutex as
//! the serialization point instead of row locks. Drives the test suite and
//! embedded/smoke runs; durability is explicitly not provided.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use opshub_core::result::AppResult;
use opshub_entity::notification::{CreateNotification, DeliveryStatus, NotificationRecord};

use super::QueueStore;

/// Mutex-guarded in-memory implementation of [`QueueStore`].
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    records: Mutex<HashMap<Uuid, NotificationRecord>>,
}

impl MemoryQueueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, NotificationRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a new notification in `pending` state.
    pub fn enqueue(&self, data: CreateNotification) -> NotificationRecord {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            recipient: data.recipient,
            channel: data.channel,
            payload: data.payload,
            priority: data.priority,
            status: DeliveryStatus::Pending,
            scheduled_for: data.scheduled_for,
            retry_count: 0,
            max_retries: data.max_retries,
            next_retry_at: None,
            error_message: None,
            sent_at: None,
            failed_at: None,
            claimed_at: None,
            created_at: Utc::now(),
        };

        let mut records = self.locked();
        records.insert(record.id, record.clone());
        record
    }

    /// Fetch a snapshot of a record.
    pub fn get(&self, id: Uuid) -> Option<NotificationRecord> {
        self.locked().get(&id).cloned()
    }

    /// Mutate a stored record in place. Intended for tests and embedded
    /// tooling that need to adjust timestamps directly.
    pub fn update_record(&self, id: Uuid, f: impl FnOnce(&mut NotificationRecord)) -> bool {
        let mut records = self.locked();
        match records.get_mut(&id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.locked().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn select_eligible(&self, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        let now = Utc::now();
        let records = self.locked();

        let mut eligible: Vec<NotificationRecord> = records
            .values()
            .filter(|r| r.is_eligible_at(now))
            .cloned()
            .collect();

        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.due_at().cmp(&b.due_at()))
        });
        eligible.truncate(limit.max(0) as usize);
        Ok(eligible)
    }

    async fn claim(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let now = Utc::now();
        let mut records = self.locked();

        let mut claimed = Vec::new();
        for id in ids {
            if let Some(record) = records.get_mut(id) {
                if record.is_eligible_at(now) {
                    record.status = DeliveryStatus::Sending;
                    record.claimed_at = Some(now);
                    claimed.push(*id);
                }
            }
        }
        Ok(claimed)
    }

    async fn record_success(&self, id: Uuid) -> AppResult<bool> {
        let mut records = self.locked();
        match records.get_mut(&id) {
            Some(record) if record.status == DeliveryStatus::Sending => {
                record.status = DeliveryStatus::Sent;
                record.sent_at = Some(Utc::now());
                record.error_message = None;
                record.claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> AppResult<Option<DeliveryStatus>> {
        let mut records = self.locked();
        match records.get_mut(&id) {
            Some(record) if record.status == DeliveryStatus::Sending => {
                let budget_remains = record.retry_count + 1 < record.max_retries;
                record.retry_count = (record.retry_count + 1).min(record.max_retries);
                record.error_message = Some(error.to_string());
                record.claimed_at = None;

                if budget_remains {
                    record.status = DeliveryStatus::FailedRetryable;
                    record.next_retry_at = Some(next_retry_at);
                } else {
                    record.status = DeliveryStatus::Dead;
                    record.next_retry_at = None;
                    record.failed_at = Some(Utc::now());
                }
                Ok(Some(record.status))
            }
            _ => Ok(None),
        }
    }

    async fn record_permanent_failure(&self, id: Uuid, error: &str) -> AppResult<bool> {
        let mut records = self.locked();
        match records.get_mut(&id) {
            Some(record) if record.status == DeliveryStatus::Sending => {
                record.status = DeliveryStatus::Dead;
                record.retry_count = (record.retry_count + 1).min(record.max_retries);
                record.next_retry_at = None;
                record.failed_at = Some(Utc::now());
                record.error_message = Some(error.to_string());
                record.claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_by_status(&self, status: DeliveryStatus) -> AppResult<i64> {
        let records = self.locked();
        Ok(records.values().filter(|r| r.status == status).count() as i64)
    }

    async fn purge_older_than(
        &self,
        statuses: &[DeliveryStatus],
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<u64> {
        let mut records = self.locked();

        let doomed: Vec<Uuid> = records
            .values()
            .filter(|r| {
                r.status.is_terminal()
                    && statuses.contains(&r.status)
                    && r.sent_at.or(r.failed_at).is_some_and(|at| at < cutoff)
            })
            .take(limit.max(0) as usize)
            .map(|r| r.id)
            .collect();

        for id in &doomed {
            records.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let mut records = self.locked();

        let mut released = 0;
        for record in records.values_mut() {
            if record.status == DeliveryStatus::Sending
                && record.claimed_at.is_some_and(|at| at < older_than)
            {
                record.status = DeliveryStatus::Pending;
                record.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use opshub_entity::notification::ChannelKind;
    use std::sync::Arc;

    fn params(priority: i32, max_retries: i32) -> CreateNotification {
        CreateNotification {
            recipient: "user-1".to_string(),
            channel: ChannelKind::Email,
            payload: serde_json::json!({"subject": "Inspection due"}),
            priority,
            scheduled_for: None,
            max_retries,
        }
    }

    #[tokio::test]
    async fn test_select_orders_by_priority_then_due_time() {
        let store = MemoryQueueStore::new();
        let low = store.enqueue(params(5, 3));
        let high = store.enqueue(params(10, 3));

        let batch = store.select_eligible(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, high.id);
        assert_eq!(batch[1].id, low.id);
    }

    #[tokio::test]
    async fn test_select_skips_future_scheduled_and_terminal() {
        let store = MemoryQueueStore::new();
        let mut future = params(0, 3);
        future.scheduled_for = Some(Utc::now() + Duration::hours(1));
        store.enqueue(future);

        let done = store.enqueue(params(0, 3));
        let claimed = store.claim(&[done.id]).await.unwrap();
        assert_eq!(claimed, vec![done.id]);
        store.record_success(done.id).await.unwrap();

        assert!(store.select_eligible(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 3));

        let first = store.claim(&[rec.id]).await.unwrap();
        let second = store.claim(&[rec.id]).await.unwrap();
        assert_eq!(first, vec![rec.id]);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_claim_has_one_winner() {
        let store = Arc::new(MemoryQueueStore::new());
        let rec = store.enqueue(params(0, 3));

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.claim(&[rec.id]).await.unwrap().len() }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.claim(&[rec.id]).await.unwrap().len() }
        });

        let wins = a.await.unwrap() + b.await.unwrap();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_retry_budget_walk_to_dead() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 3));

        for attempt in 1..=3 {
            // make the retryable record due immediately
            if attempt > 1 {
                let mut records = store.records.lock().unwrap();
                records.get_mut(&rec.id).unwrap().next_retry_at =
                    Some(Utc::now() - Duration::seconds(1));
                drop(records);
            }
            let claimed = store.claim(&[rec.id]).await.unwrap();
            assert_eq!(claimed.len(), 1, "attempt {attempt} should claim");

            let status = store
                .record_failure(rec.id, "smtp timeout", Utc::now() + Duration::minutes(5))
                .await
                .unwrap()
                .unwrap();

            let snapshot = store.get(rec.id).unwrap();
            assert_eq!(snapshot.retry_count, attempt);
            if attempt < 3 {
                assert_eq!(status, DeliveryStatus::FailedRetryable);
                assert!(snapshot.failed_at.is_none());
            } else {
                assert_eq!(status, DeliveryStatus::Dead);
                assert!(snapshot.failed_at.is_some());
            }
            assert!(snapshot.retry_count <= snapshot.max_retries);
        }
    }

    #[tokio::test]
    async fn test_zero_budget_dead_letters_on_first_failure() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 0));

        store.claim(&[rec.id]).await.unwrap();
        let status = store
            .record_failure(rec.id, "refused", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, DeliveryStatus::Dead);
        assert_eq!(store.get(rec.id).unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn test_record_success_is_idempotent() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 3));
        store.claim(&[rec.id]).await.unwrap();

        assert!(store.record_success(rec.id).await.unwrap());
        let sent_at = store.get(rec.id).unwrap().sent_at;

        assert!(!store.record_success(rec.id).await.unwrap());
        assert_eq!(store.get(rec.id).unwrap().sent_at, sent_at);
    }

    #[tokio::test]
    async fn test_duplicate_failure_does_not_double_increment() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 5));
        store.claim(&[rec.id]).await.unwrap();

        let later = Utc::now() + Duration::minutes(1);
        assert!(store.record_failure(rec.id, "x", later).await.unwrap().is_some());
        assert!(store.record_failure(rec.id, "x", later).await.unwrap().is_none());
        assert_eq!(store.get(rec.id).unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_remaining_budget() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 10));
        store.claim(&[rec.id]).await.unwrap();

        assert!(store.record_permanent_failure(rec.id, "no such user").await.unwrap());
        let snapshot = store.get(rec.id).unwrap();
        assert_eq!(snapshot.status, DeliveryStatus::Dead);
        assert!(snapshot.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_purge_removes_only_old_terminal_records() {
        let store = MemoryQueueStore::new();

        let sent = store.enqueue(params(0, 3));
        store.claim(&[sent.id]).await.unwrap();
        store.record_success(sent.id).await.unwrap();
        // age the terminal timestamp past the cutoff
        {
            let mut records = store.records.lock().unwrap();
            records.get_mut(&sent.id).unwrap().sent_at =
                Some(Utc::now() - Duration::days(60));
        }

        let fresh_sent = store.enqueue(params(0, 3));
        store.claim(&[fresh_sent.id]).await.unwrap();
        store.record_success(fresh_sent.id).await.unwrap();

        let pending = store.enqueue(params(0, 3));
        {
            // ancient but still pending; must survive any purge
            let mut records = store.records.lock().unwrap();
            records.get_mut(&pending.id).unwrap().created_at =
                Utc::now() - Duration::days(365);
        }

        let cutoff = Utc::now() - Duration::days(30);
        let removed = store
            .purge_older_than(&[DeliveryStatus::Sent, DeliveryStatus::Dead], cutoff, 100)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(sent.id).is_none());
        assert!(store.get(fresh_sent.id).is_some());
        assert!(store.get(pending.id).is_some());
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let store = MemoryQueueStore::new();
        let rec = store.enqueue(params(0, 3));
        store.claim(&[rec.id]).await.unwrap();
        {
            let mut records = store.records.lock().unwrap();
            records.get_mut(&rec.id).unwrap().claimed_at =
                Some(Utc::now() - Duration::minutes(30));
        }

        let released = store
            .release_stale_claims(Utc::now() - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(released, 1);
        assert_eq!(store.get(rec.id).unwrap().status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let store = MemoryQueueStore::new();
        store.enqueue(params(0, 3));
        store.enqueue(params(0, 3));
        let claimed = store.enqueue(params(0, 3));
        store.claim(&[claimed.id]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.depth, 3);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.dead, 0);
    }
}
