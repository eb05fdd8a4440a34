/// API route handlers
///
/// Organized by resource:
///
/// - `health`: Health check endpoint
/// - `profile`: Own profile, lookups and people search
/// - `rooms`: Room lifecycle, membership, invites and admins
/// - `messages`: Room history and posting
/// - `notifications`: Per-user notifications
/// - `languages`: Translation targets
/// - `ws`: User and room websockets

pub mod health;
pub mod languages;
pub mod messages;
pub mod notifications;
pub mod profile;
pub mod rooms;
pub mod ws;

use berth_shared::models::Room;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Loads a room or fails with 404
pub(crate) async fn load_room(state: &AppState, room_id: Uuid) -> ApiResult<Room> {
    state
        .chat
        .get_room(room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))
}

/// Fails with 403 unless `user_id` administers the room
pub(crate) async fn require_admin(state: &AppState, room_id: Uuid, user_id: &str) -> ApiResult<()> {
    if state.chat.is_admin(room_id, user_id).await? {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Room admin rights required".to_string()))
    }
}
