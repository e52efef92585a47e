//! # opshub-database
//!
//! PostgreSQL connection management and the concrete notification queue
//! repository for OpsHub.

pub mod connection;
pub mod repositories;

pub use connection::DatabasePool;
pub use repositories::NotificationQueueRepository;
