//! Repository implementations for OpsHub entities.

pub mod notification_queue;

pub use notification_queue::NotificationQueueRepository;
