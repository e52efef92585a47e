//! Notification queue domain entities.

pub mod channel;
pub mod model;
pub mod status;

pub use channel::ChannelKind;
pub use model::{CreateNotification, NotificationRecord};
pub use status::DeliveryStatus;
