/// Data records for the chat service
///
/// # Models
///
/// - `profile`: user profiles (relational)
/// - `room`: chat rooms and membership views
/// - `message`: room messages with optional attachment and translations
/// - `notification`: per-user notifications (room invites and the like)
///
/// Profiles live in PostgreSQL. Rooms, messages and notifications live in
/// the key-value store; their relations are plain sets (see `crate::redis::keys`).

pub mod message;
pub mod notification;
pub mod profile;
pub mod room;

pub use message::{Attachment, Message, MessageMetadata};
pub use notification::{Notification, NotificationKind};
pub use profile::{NewProfile, Profile, UpdateProfile};
pub use room::{CreateRoom, Room, RoomMember, UpdateRoom};
