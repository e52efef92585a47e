//! Notification queue repository implementation.
//!
//! All mutation goes through status-guarded `UPDATE`s, so the repository is
//! safe under concurrent callers including multiple scheduler processes: a
//! claim or write-back only applies while the row is still in the state the
//! caller observed.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use opshub_core::error::{AppError, ErrorKind};
use opshub_core::result::AppResult;
use opshub_entity::notification::{CreateNotification, DeliveryStatus, NotificationRecord};

/// Repository for notification queue operations.
#[derive(Debug, Clone)]
pub struct NotificationQueueRepository {
    pool: PgPool,
}

impl NotificationQueueRepository {
    /// Create a new notification queue repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a new notification in `pending` state.
    pub async fn enqueue(&self, data: &CreateNotification) -> AppResult<NotificationRecord> {
        sqlx::query_as::<_, NotificationRecord>(
            "INSERT INTO notifications (recipient, channel, payload, priority, scheduled_for, max_retries) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(&data.recipient)
        .bind(data.channel)
        .bind(&data.payload)
        .bind(data.priority)
        .bind(data.scheduled_for)
        .bind(data.max_retries)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to enqueue notification", e))
    }

    /// Find a notification by ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<NotificationRecord>> {
        sqlx::query_as::<_, NotificationRecord>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find notification", e)
            })
    }

    /// Select up to `limit` eligible records, ordered by priority descending
    /// then due-time ascending.
    ///
    /// Eligible means: pending with `scheduled_for` unset or passed, or
    /// retryable with `next_retry_at` passed and retry budget remaining.
    pub async fn select_eligible(&self, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        sqlx::query_as::<_, NotificationRecord>(
            "SELECT * FROM notifications \
             WHERE (status = 'pending' AND (scheduled_for IS NULL OR scheduled_for <= NOW())) \
                OR (status = 'failed_retryable' AND next_retry_at <= NOW() AND retry_count < max_retries) \
             ORDER BY priority DESC, \
                 CASE WHEN status = 'pending' THEN COALESCE(scheduled_for, created_at) \
                      ELSE next_retry_at END ASC \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to select eligible notifications", e)
        })
    }

    /// Atomically claim the given ids for dispatch.
    ///
    /// Only rows still satisfying the eligibility predicate transition to
    /// `sending`; rows another scheduler already claimed are skipped, not
    /// errors. Returns the ids actually claimed.
    pub async fn claim(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_scalar::<_, Uuid>(
            "UPDATE notifications SET status = 'sending', claimed_at = NOW() \
             WHERE id IN ( \
                SELECT id FROM notifications \
                WHERE id = ANY($1) \
                AND ((status = 'pending' AND (scheduled_for IS NULL OR scheduled_for <= NOW())) \
                  OR (status = 'failed_retryable' AND next_retry_at <= NOW() AND retry_count < max_retries)) \
                FOR UPDATE SKIP LOCKED \
             ) RETURNING id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to claim notifications", e)
        })
    }

    /// Mark a claimed notification as delivered.
    ///
    /// Guarded on the `sending` state, so a duplicate write-back for an
    /// already-sent record is a no-op. Returns whether the update applied.
    pub async fn record_success(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'sent', sent_at = NOW(), \
             error_message = NULL, claimed_at = NULL \
             WHERE id = $1 AND status = 'sending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to record delivery success", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a transient delivery failure for a claimed notification.
    ///
    /// Increments `retry_count`; while budget remains the record becomes
    /// `failed_retryable` with the supplied `next_retry_at`, otherwise it is
    /// dead-lettered with `failed_at = now`. The `sending` guard makes a
    /// duplicate write-back a no-op, never double-incrementing. Returns the
    /// resulting status, or `None` if the record was not in flight.
    pub async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> AppResult<Option<DeliveryStatus>> {
        sqlx::query_scalar::<_, DeliveryStatus>(
            "UPDATE notifications SET \
                retry_count = LEAST(retry_count + 1, max_retries), \
                status = CASE WHEN retry_count + 1 < max_retries \
                    THEN 'failed_retryable'::delivery_status \
                    ELSE 'dead'::delivery_status END, \
                next_retry_at = CASE WHEN retry_count + 1 < max_retries THEN $3 ELSE NULL END, \
                failed_at = CASE WHEN retry_count + 1 < max_retries THEN NULL ELSE NOW() END, \
                error_message = $2, \
                claimed_at = NULL \
             WHERE id = $1 AND status = 'sending' \
             RETURNING status",
        )
        .bind(id)
        .bind(error)
        .bind(next_retry_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to record delivery failure", e)
        })
    }

    /// Dead-letter a claimed notification after an unrecoverable channel
    /// error, regardless of remaining retry budget.
    pub async fn record_permanent_failure(&self, id: Uuid, error: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'dead', \
             retry_count = LEAST(retry_count + 1, max_retries), \
             failed_at = NOW(), next_retry_at = NULL, error_message = $2, claimed_at = NULL \
             WHERE id = $1 AND status = 'sending'",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to record permanent failure", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    /// Count notifications in a given status.
    pub async fn count_by_status(&self, status: DeliveryStatus) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to count notifications", e)
            })
    }

    /// Delete up to `limit` terminal records in `statuses` whose terminal
    /// timestamp precedes `cutoff`. Non-terminal records are never deleted
    /// regardless of the statuses passed in.
    pub async fn purge_older_than(
        &self,
        statuses: &[DeliveryStatus],
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE id IN ( \
                SELECT id FROM notifications \
                WHERE status = ANY($1) AND status IN ('sent', 'dead') \
                AND COALESCE(sent_at, failed_at) < $2 \
                LIMIT $3 \
             )",
        )
        .bind(statuses)
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to purge notifications", e)
        })?;
        Ok(result.rows_affected())
    }

    /// Release claims that have been in flight longer than the lease allows
    /// (crashed worker process) back to `pending`. Returns the count.
    pub async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'pending', claimed_at = NULL \
             WHERE status = 'sending' AND claimed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to release stale claims", e)
        })?;
        Ok(result.rows_affected())
    }

    /// List dead-lettered notifications, most recently failed first, for
    /// manual inspection.
    pub async fn list_dead(&self, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        sqlx::query_as::<_, NotificationRecord>(
            "SELECT * FROM notifications WHERE status = 'dead' \
             ORDER BY failed_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list dead notifications", e)
        })
    }
}
