//! Notification channel kind enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of delivery channel a notification is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "channel_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Email delivery.
    Email,
    /// Mobile/desktop push delivery.
    Push,
    /// In-app inbox delivery.
    InApp,
}

impl ChannelKind {
    /// Return the channel kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
            Self::InApp => "in_app",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
