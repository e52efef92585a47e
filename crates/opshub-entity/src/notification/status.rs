//! Delivery status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queued notification.
///
/// `Sending` is the in-flight claim marker: a record enters it through an
/// atomic conditional transition so that no two scheduler processes can
/// dispatch the same record. `Sent` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for first dispatch (or released back after a stale claim).
    Pending,
    /// Claimed by a worker, delivery attempt in flight.
    Sending,
    /// Successfully delivered.
    Sent,
    /// Transient failure, will be retried once `next_retry_at` passes.
    FailedRetryable,
    /// Retry budget exhausted or unrecoverable channel error; never retried.
    Dead,
}

impl DeliveryStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Dead)
    }

    /// Check if a record in this status can be selected for dispatch
    /// (subject to its due-time, which the record itself knows).
    pub fn is_selectable(&self) -> bool {
        matches!(self, Self::Pending | Self::FailedRetryable)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::FailedRetryable => "failed_retryable",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(DeliveryStatus::Sent.is_terminal());
        assert!(DeliveryStatus::Dead.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Sending.is_terminal());
        assert!(!DeliveryStatus::FailedRetryable.is_terminal());
    }

    #[test]
    fn test_selectable_states() {
        assert!(DeliveryStatus::Pending.is_selectable());
        assert!(DeliveryStatus::FailedRetryable.is_selectable());
        assert!(!DeliveryStatus::Sending.is_selectable());
        assert!(!DeliveryStatus::Sent.is_selectable());
        assert!(!DeliveryStatus::Dead.is_selectable());
    }
}
