//! Queue store contract.
//!
//! The store is the single source of truth for record lifecycle state and
//! the only serialization point between scheduler processes: `claim` and the
//! write-back operations are atomic conditional transitions guarded by the
//! record's current status.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opshub_core::result::AppResult;
use opshub_database::NotificationQueueRepository;
use opshub_entity::notification::{DeliveryStatus, NotificationRecord};

pub use memory::MemoryQueueStore;

/// Durable record store for notification work items.
///
/// All operations are safe under concurrent callers, including multiple
/// scheduler processes. A failed `claim` for an id another process already
/// took is not an error; the id is simply absent from the returned set.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Return up to `limit` eligible records, ordered by priority descending
    /// then due-time ascending.
    async fn select_eligible(&self, limit: i64) -> AppResult<Vec<NotificationRecord>>;

    /// Atomically transition the given ids into the in-flight state.
    /// Returns the ids actually claimed by this caller.
    async fn claim(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>>;

    /// Mark an in-flight record as delivered. Idempotent: a duplicate call
    /// for an already-sent record is a no-op and returns `false`.
    async fn record_success(&self, id: Uuid) -> AppResult<bool>;

    /// Record a transient failure for an in-flight record, scheduling the
    /// retry at `next_retry_at` while budget remains, dead-lettering
    /// otherwise. Returns the resulting status, or `None` if the record was
    /// not in flight (duplicate write-back).
    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> AppResult<Option<DeliveryStatus>>;

    /// Dead-letter an in-flight record after an unrecoverable channel error.
    async fn record_permanent_failure(&self, id: Uuid, error: &str) -> AppResult<bool>;

    /// Count records in a given status.
    async fn count_by_status(&self, status: DeliveryStatus) -> AppResult<i64>;

    /// Delete up to `limit` terminal records in `statuses` whose terminal
    /// timestamp precedes `cutoff`; never touches non-terminal records.
    /// Returns the number removed.
    async fn purge_older_than(
        &self,
        statuses: &[DeliveryStatus],
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<u64>;

    /// Release in-flight claims taken before `older_than` back to pending
    /// (crashed worker recovery). Returns the number released.
    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> AppResult<u64>;

    /// Snapshot the queue counters for monitoring.
    async fn stats(&self) -> AppResult<QueueStats> {
        let pending = self.count_by_status(DeliveryStatus::Pending).await?;
        let in_flight = self.count_by_status(DeliveryStatus::Sending).await?;
        let retryable = self.count_by_status(DeliveryStatus::FailedRetryable).await?;
        let sent = self.count_by_status(DeliveryStatus::Sent).await?;
        let dead = self.count_by_status(DeliveryStatus::Dead).await?;

        Ok(QueueStats {
            pending,
            in_flight,
            retryable,
            sent,
            dead,
            depth: pending + in_flight + retryable,
        })
    }
}

/// Queue counters exposed to external monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Records waiting for first dispatch.
    pub pending: i64,
    /// Records with a delivery attempt in flight.
    pub in_flight: i64,
    /// Records waiting for a retry slot.
    pub retryable: i64,
    /// Delivered records not yet purged.
    pub sent: i64,
    /// Dead-lettered records not yet purged.
    pub dead: i64,
    /// Undelivered records (pending + in-flight + retryable).
    pub depth: i64,
}

#[async_trait]
impl QueueStore for NotificationQueueRepository {
    async fn select_eligible(&self, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        NotificationQueueRepository::select_eligible(self, limit).await
    }

    async fn claim(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        NotificationQueueRepository::claim(self, ids).await
    }

    async fn record_success(&self, id: Uuid) -> AppResult<bool> {
        NotificationQueueRepository::record_success(self, id).await
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> AppResult<Option<DeliveryStatus>> {
        NotificationQueueRepository::record_failure(self, id, error, next_retry_at).await
    }

    async fn record_permanent_failure(&self, id: Uuid, error: &str) -> AppResult<bool> {
        NotificationQueueRepository::record_permanent_failure(self, id, error).await
    }

    async fn count_by_status(&self, status: DeliveryStatus) -> AppResult<i64> {
        NotificationQueueRepository::count_by_status(self, status).await
    }

    async fn purge_older_than(
        &self,
        statuses: &[DeliveryStatus],
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<u64> {
        NotificationQueueRepository::purge_older_than(self, statuses, cutoff, limit).await
    }

    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        NotificationQueueRepository::release_stale_claims(self, older_than).await
    }
}
