//! Payloads handed to downstream collaborators.

pub mod notification;

pub use notification::{MatchStatus, NotificationItem, NotificationPayload};
