//! Notification delivery configuration.

use serde::{Deserialize, Serialize};

/// Notification delivery queue configuration.
///
/// `batch_size` bounds the work claimed per scheduler tick,
/// `worker_pool_size` bounds concurrent delivery attempts independently of
/// the batch size, and the backoff settings shape the retry schedule for
/// transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Whether the delivery runner is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of records claimed per scheduler tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Interval in milliseconds between queue polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Hard timeout in milliseconds for a single delivery attempt.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Seconds a claim may stay in flight before it is considered stale
    /// (crashed worker) and released back to pending.
    #[serde(default = "default_claim_lease_seconds")]
    pub claim_lease_seconds: u64,
    /// Days a terminal (sent/dead) record is retained before purging.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Interval in seconds between retention sweeps.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Maximum number of records deleted per purge batch.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: u32,
    /// Base retry delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum retry delay in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Jitter bound as a fraction of the delay (0.2 = ±20%).
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    /// Webhook endpoint for the reference delivery channel.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            batch_size: default_batch_size(),
            worker_pool_size: default_worker_pool_size(),
            poll_interval_ms: default_poll_interval_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            claim_lease_seconds: default_claim_lease_seconds(),
            retention_days: default_retention_days(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            purge_batch_size: default_purge_batch_size(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            backoff_jitter: default_backoff_jitter(),
            webhook_url: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> u32 {
    50
}

fn default_worker_pool_size() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_delivery_timeout_ms() -> u64 {
    30_000
}

fn default_claim_lease_seconds() -> u64 {
    600
}

fn default_retention_days() -> i64 {
    30
}

fn default_sweep_interval_seconds() -> u64 {
    3_600
}

fn default_purge_batch_size() -> u32 {
    500
}

fn default_backoff_base_ms() -> u64 {
    30_000
}

fn default_backoff_cap_ms() -> u64 {
    3_600_000
}

fn default_backoff_jitter() -> f64 {
    0.2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = NotifierConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.worker_pool_size, 8);
        assert_eq!(cfg.backoff_jitter, 0.2);
        assert!(cfg.webhook_url.is_none());
    }
}
