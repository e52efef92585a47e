//! Delivery channel abstraction.
//!
//! The queue is transport-agnostic: email, push, and in-app transports live
//! behind [`DeliveryChannel`]. The queue guarantees at-least-once invocation;
//! idempotency on redelivery is the transport's concern.

use async_trait::async_trait;

use opshub_entity::notification::NotificationRecord;

/// Error from a delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Transient failure (network error, channel busy); may retry.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Unrecoverable failure (invalid recipient, rejected payload); do not
    /// retry.
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

/// Trait for delivery channel implementations.
#[async_trait]
pub trait DeliveryChannel: Send + Sync + std::fmt::Debug {
    /// Attempt to deliver a single notification.
    async fn deliver(&self, record: &NotificationRecord) -> Result<(), DeliveryError>;
}

/// Reference channel that POSTs notifications as JSON to a webhook endpoint.
///
/// Used for local wiring and smoke testing; production email/push transports
/// are separate services implementing [`DeliveryChannel`].
#[derive(Debug)]
pub struct WebhookChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookChannel {
    /// Create a webhook channel targeting the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn deliver(&self, record: &NotificationRecord) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "id": record.id,
            "recipient": record.recipient,
            "channel": record.channel,
            "priority": record.priority,
            "payload": record.payload,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // 408/429 and server errors are worth retrying; other client errors
        // indicate a request the endpoint will never accept.
        if status.is_client_error()
            && status != reqwest::StatusCode::REQUEST_TIMEOUT
            && status != reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            Err(DeliveryError::Permanent(format!(
                "Webhook rejected notification: HTTP {status}"
            )))
        } else {
            Err(DeliveryError::Transient(format!(
                "Webhook returned HTTP {status}"
            )))
        }
    }
}
