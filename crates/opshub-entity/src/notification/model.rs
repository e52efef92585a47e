//! Notification record entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::channel::ChannelKind;
use super::status::DeliveryStatus;

/// A notification queued for delivery. One row per delivery attempt target.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    /// Unique notification identifier.
    pub id: Uuid,
    /// Opaque reference to the addressee, owned by the identity system.
    pub recipient: String,
    /// Delivery channel kind.
    pub channel: ChannelKind,
    /// Delivery content, opaque to the queue (JSON).
    pub payload: serde_json::Value,
    /// Dispatch priority; higher is dispatched first.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: DeliveryStatus,
    /// Earliest dispatch time (None = eligible immediately).
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Number of failed delivery attempts so far.
    pub retry_count: i32,
    /// Maximum failed attempts before dead-lettering; fixed at creation.
    pub max_retries: i32,
    /// Next retry time; meaningful only while `FailedRetryable`.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last failure detail.
    pub error_message: Option<String>,
    /// When the notification was delivered.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the notification was dead-lettered.
    pub failed_at: Option<DateTime<Utc>>,
    /// When the most recent claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Check if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The due-time used for dispatch ordering: `scheduled_for` (falling
    /// back to `created_at`) while pending, `next_retry_at` while retryable.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            DeliveryStatus::Pending => Some(self.scheduled_for.unwrap_or(self.created_at)),
            DeliveryStatus::FailedRetryable => self.next_retry_at,
            _ => None,
        }
    }

    /// Check if the record is eligible for dispatch at `now`.
    ///
    /// Pending records are eligible once `scheduled_for` has passed (or was
    /// never set); retryable records once `next_retry_at` has passed while
    /// retry budget remains.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            DeliveryStatus::Pending => self.scheduled_for.is_none_or(|at| at <= now),
            DeliveryStatus::FailedRetryable => {
                self.retry_count < self.max_retries
                    && self.next_retry_at.is_some_and(|at| at <= now)
            }
            _ => false,
        }
    }
}

/// Data required to enqueue a new notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    /// Opaque addressee reference.
    pub recipient: String,
    /// Delivery channel kind.
    pub channel: ChannelKind,
    /// Delivery content (JSON).
    pub payload: serde_json::Value,
    /// Dispatch priority; higher first.
    #[serde(default)]
    pub priority: i32,
    /// Earliest dispatch time.
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Maximum failed attempts before dead-lettering.
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_max_retries() -> i32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: DeliveryStatus) -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            recipient: "user-42".to_string(),
            channel: ChannelKind::Email,
            payload: serde_json::json!({"subject": "Work order assigned"}),
            priority: 0,
            status,
            scheduled_for: None,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: None,
            error_message: None,
            sent_at: None,
            failed_at: None,
            claimed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pending_without_schedule_is_eligible() {
        assert!(record(DeliveryStatus::Pending).is_eligible_at(Utc::now()));
    }

    #[test]
    fn test_pending_scheduled_in_future_is_not_eligible() {
        let now = Utc::now();
        let mut rec = record(DeliveryStatus::Pending);
        rec.scheduled_for = Some(now + Duration::minutes(5));
        assert!(!rec.is_eligible_at(now));
        assert!(rec.is_eligible_at(now + Duration::minutes(5)));
    }

    #[test]
    fn test_retryable_waits_for_next_retry_at() {
        let now = Utc::now();
        let mut rec = record(DeliveryStatus::FailedRetryable);
        rec.retry_count = 1;
        rec.next_retry_at = Some(now + Duration::minutes(1));
        assert!(!rec.is_eligible_at(now));
        assert!(rec.is_eligible_at(now + Duration::minutes(2)));
    }

    #[test]
    fn test_exhausted_budget_is_not_eligible() {
        let now = Utc::now();
        let mut rec = record(DeliveryStatus::FailedRetryable);
        rec.retry_count = 3;
        rec.next_retry_at = Some(now - Duration::minutes(1));
        assert!(!rec.is_eligible_at(now));
    }

    #[test]
    fn test_terminal_and_inflight_never_eligible() {
        let now = Utc::now();
        assert!(!record(DeliveryStatus::Sending).is_eligible_at(now));
        assert!(!record(DeliveryStatus::Sent).is_eligible_at(now));
        assert!(!record(DeliveryStatus::Dead).is_eligible_at(now));
    }

    #[test]
    fn test_due_at_prefers_schedule_then_created() {
        let mut rec = record(DeliveryStatus::Pending);
        assert_eq!(rec.due_at(), Some(rec.created_at));
        let at = Utc::now() + Duration::hours(1);
        rec.scheduled_for = Some(at);
        assert_eq!(rec.due_at(), Some(at));
    }
}
