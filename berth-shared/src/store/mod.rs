/// Storage for profiles and chat state
///
/// Handlers talk to two traits so the backends can be swapped:
///
/// | Trait | Production | In-process |
/// |---|---|---|
/// | [`ProfileStore`] | [`pg_profile::PgProfileStore`] | [`memory::MemoryProfileStore`] |
/// | [`ChatStore`] | [`redis_chat::RedisChatStore`] | [`memory::MemoryChatStore`] |
///
/// # Invariants
///
/// Every `ChatStore` implementation keeps these:
///
/// - a room's creator is a member and an admin
/// - admins are always members; removing a member drops admin rights
/// - a user's room set mirrors the member sets
/// - history is oldest first and never longer than the configured limit
/// - `messages(since)` includes messages stamped exactly at `since`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Message, NewProfile, Notification, Profile, Room, UpdateProfile};

pub mod memory;
pub mod pg_profile;
pub mod redis_chat;

pub use memory::{MemoryChatStore, MemoryProfileStore};
pub use pg_profile::PgProfileStore;
pub use redis_chat::RedisChatStore;

/// Default number of messages kept per room
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint or relation rule violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Admin rights require membership
    #[error("User {user_id} is not a member of room {room_id}")]
    NotMember { room_id: Uuid, user_id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    /// A stored record could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.constraint() {
                Some(constraint) => {
                    StoreError::Conflict(format!("Constraint violation: {}", constraint))
                }
                None => StoreError::Database(db_err.to_string()),
            },
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Profile persistence
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<Profile>, StoreError>;

    /// Creates the profile, or refreshes its username if it already exists
    ///
    /// Fields the user edited are never overwritten.
    ///
    /// # Errors
    ///
    /// `StoreError::Conflict` if the username belongs to another profile.
    async fn upsert(&self, profile: NewProfile) -> Result<Profile, StoreError>;

    /// # Errors
    ///
    /// `StoreError::NotFound` if no profile has this ID.
    async fn update(&self, id: &str, update: UpdateProfile) -> Result<Profile, StoreError>;

    /// Case-insensitive substring match on username and display name
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Profile>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Room, message and notification persistence
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Stores a new room with its creator as member and admin
    async fn create_room(&self, room: &Room) -> Result<(), StoreError>;

    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, StoreError>;

    /// Rewrites name and visibility of an existing room
    async fn update_room(&self, room: &Room) -> Result<(), StoreError>;

    /// Public rooms, oldest first
    async fn list_public_rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Rooms the user belongs to, oldest first
    async fn list_user_rooms(&self, user_id: &str) -> Result<Vec<Room>, StoreError>;

    /// Member subjects, sorted
    async fn members(&self, room_id: Uuid) -> Result<Vec<String>, StoreError>;

    /// Admin subjects, sorted
    async fn admins(&self, room_id: Uuid) -> Result<Vec<String>, StoreError>;

    async fn is_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    async fn is_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    /// Returns `true` if the user was not a member before
    async fn add_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    /// Removes membership and admin rights; returns `true` if the user was a member
    async fn remove_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    /// # Errors
    ///
    /// `StoreError::NotMember` if the user is not a member of the room.
    async fn add_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    async fn remove_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    async fn add_invite(&self, room_id: Uuid, user_id: &str) -> Result<(), StoreError>;

    /// Consumes a pending invite; returns whether one existed
    async fn take_invite(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError>;

    /// Appends to the room history, dropping the oldest entries past the limit
    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// History oldest first, from `since` (inclusive), at most the last `limit`
    async fn messages(
        &self,
        room_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError>;

    /// The last `count` messages, oldest first
    async fn recent_messages(&self, room_id: Uuid, count: usize)
        -> Result<Vec<Message>, StoreError>;

    async fn push_notification(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> Result<(), StoreError>;

    /// Newest first
    async fn notifications(&self, user_id: &str) -> Result<Vec<Notification>, StoreError>;

    /// Returns `false` if the notification does not exist
    async fn mark_notification_read(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Applies the `since`/`limit` window to an oldest-first history
pub(crate) fn window(
    history: impl IntoIterator<Item = Message>,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
) -> Vec<Message> {
    let mut out: Vec<Message> = history
        .into_iter()
        .filter(|m| since.map_or(true, |since| m.timestamp >= since))
        .collect();

    if let Some(limit) = limit {
        if out.len() > limit {
            out.drain(..out.len() - limit);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(room_id: Uuid, offset_secs: i64, text: &str) -> Message {
        let mut m = Message::new(room_id, "sub-1", "ada", text);
        m.timestamp = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
            + Duration::seconds(offset_secs);
        m
    }

    #[test]
    fn test_window_since_is_inclusive() {
        let room = Uuid::new_v4();
        let history = vec![at(room, 0, "a"), at(room, 10, "b"), at(room, 20, "c")];
        let since = history[1].timestamp;

        let out = window(history, Some(since), None);
        let texts: Vec<_> = out.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn test_window_limit_keeps_newest() {
        let room = Uuid::new_v4();
        let history = vec![at(room, 0, "a"), at(room, 10, "b"), at(room, 20, "c")];

        let out = window(history, None, Some(2));
        let texts: Vec<_> = out.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }
}
