/// User notification model
///
/// Notifications are stored per user as a hash of ID to JSON and pushed to
/// the user's websocket channel when created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The user was invited to a private room
    RoomInvite,
    /// The user was removed from a room by an admin
    RemovedFromRoom,
    /// The user was made an admin of a room
    AdminGranted,
}

/// A notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: NotificationKind,

    pub room_id: Uuid,

    pub room_name: String,

    /// Subject of the user who caused the notification
    pub invited_by: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        room_id: Uuid,
        room_name: impl Into<String>,
        invited_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            room_id,
            room_name: room_name.into(),
            invited_by: invited_by.into(),
            timestamp: Utc::now(),
            read: false,
        }
    }
}
