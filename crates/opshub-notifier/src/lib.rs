//! Asynchronous notification delivery for OpsHub.
//!
//! This crate provides:
//! - The [`store::QueueStore`] contract with Postgres-backed and in-memory
//!   implementations
//! - A [`backoff::BackoffPolicy`] computing retry schedules
//! - A [`dispatcher::Dispatcher`] fanning claimed work across a bounded
//!   worker pool
//! - A [`runner::DeliveryRunner`] polling and claiming eligible work
//! - A [`sweeper::RetentionSweeper`] purging old terminal records

pub mod backoff;
pub mod channel;
pub mod dispatcher;
pub mod runner;
pub mod store;
pub mod sweeper;

pub use runner::DeliveryRunner;
pub use sweeper::RetentionSweeper;
