/// Message posting, shared by `POST /rooms/:id/message` and room sockets,
/// plus the publish helpers the room routes use
use berth_shared::{
    auth::AuthContext,
    events::{BusEvent, ServerEvent},
    models::{Attachment, Message, Notification},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Body of a new message
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PostMessageRequest {
    #[validate(
        length(min = 1, max = 4000, message = "Message must be 1-4000 characters"),
        custom(function = "not_blank")
    )]
    pub text: String,

    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// Rejects values that are empty once trimmed
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Must not be blank".into());
        return Err(error);
    }
    Ok(())
}

/// Stores a message from `auth` in `room_id` and publishes it to the room
///
/// The timestamp and sender come from the server and the token, never from
/// the client. When translation is configured the message is annotated before
/// it is stored.
///
/// # Errors
///
/// - `NotFound` if the room does not exist
/// - `Forbidden` if the caller is not a member
/// - `ValidationError` for empty or oversized text
pub async fn post_message(
    state: &AppState,
    room_id: Uuid,
    auth: &AuthContext,
    request: PostMessageRequest,
) -> ApiResult<Message> {
    request.validate()?;

    if state.chat.get_room(room_id).await?.is_none() {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }
    if !state.chat.is_member(room_id, &auth.user_id).await? {
        return Err(ApiError::Forbidden(
            "Only members can post to this room".to_string(),
        ));
    }

    let mut message = Message::new(room_id, &auth.user_id, &auth.username, request.text);
    if let Some(attachment) = request.attachment {
        message = message.with_attachment(attachment);
    }

    if let Some(translator) = &state.translator {
        if let Some(metadata) = translator.annotate(&message.text).await {
            message = message.with_metadata(metadata);
        }
    }

    state.chat.append_message(&message).await?;

    tracing::debug!(
        room_id = %room_id,
        message_id = %message.id,
        sender = %auth.user_id,
        "Message stored"
    );

    broadcast(
        state,
        BusEvent::room(room_id, ServerEvent::Message(message.clone())),
    )
    .await;

    Ok(message)
}

/// Publishes an event; failures are logged and swallowed
pub async fn broadcast(state: &AppState, event: BusEvent) {
    let channel = event.channel.clone();
    if let Err(e) = state.bus.publish(event).await {
        tracing::warn!(channel = %channel, error = %e, "Failed to publish event");
    }
}

/// Stores a notification for `user_id` and pushes it to their socket
///
/// # Errors
///
/// Returns an error only if the notification cannot be stored.
pub async fn notify(state: &AppState, user_id: &str, notification: Notification) -> ApiResult<()> {
    state.chat.push_notification(user_id, &notification).await?;
    tracing::debug!(
        user_id = %user_id,
        kind = ?notification.kind,
        room_id = %notification.room_id,
        "Notification stored"
    );
    broadcast(
        state,
        BusEvent::user(user_id, ServerEvent::Notification { notification }),
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use berth_shared::models::{CreateRoom, Room};

    fn auth(user_id: &str) -> AuthContext {
        AuthContext {
            user_id: user_id.to_string(),
            username: format!("{}-name", user_id),
            email: None,
            name: None,
        }
    }

    async fn state_with_room() -> (AppState, Uuid) {
        let state = AppState::in_memory(Config::in_memory(
            "test-secret-key-at-least-32-characters-long",
        ));
        let room = Room::new(CreateRoom {
            name: "general".to_string(),
            is_public: true,
            created_by: "alice".to_string(),
        });
        state.chat.create_room(&room).await.unwrap();
        (state, room.id)
    }

    fn request(text: &str) -> PostMessageRequest {
        PostMessageRequest {
            text: text.to_string(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_post_message_persists_and_broadcasts() {
        let (state, room_id) = state_with_room().await;
        let mut rx = state.hub.subscribe_room(room_id);

        let message = post_message(&state, room_id, &auth("alice"), request("hello"))
            .await
            .unwrap();
        assert_eq!(message.sender, "alice-name");
        assert_eq!(message.sender_id, "alice");

        let history = state.chat.recent_messages(room_id, 10).await.unwrap();
        assert_eq!(history, vec![message.clone()]);

        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Message(message));
    }

    #[tokio::test]
    async fn test_non_member_is_forbidden() {
        let (state, room_id) = state_with_room().await;
        let err = post_message(&state, room_id, &auth("mallory"), request("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let (state, _) = state_with_room().await;
        let err = post_message(&state, Uuid::new_v4(), &auth("alice"), request("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notify_stores_and_pushes() {
        use berth_shared::models::NotificationKind;

        let (state, room_id) = state_with_room().await;
        let mut rx = state.hub.subscribe_user("bob");

        let notification =
            Notification::new(NotificationKind::RoomInvite, room_id, "general", "alice");
        notify(&state, "bob", notification.clone()).await.unwrap();

        assert_eq!(
            state.chat.notifications("bob").await.unwrap(),
            vec![notification.clone()]
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::Notification { notification }
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let (state, room_id) = state_with_room().await;
        for text in ["", "  \n\t "] {
            let err = post_message(&state, room_id, &auth("alice"), request(text))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::ValidationError(_)));
        }
        assert!(state.chat.recent_messages(room_id, 10).await.unwrap().is_empty());
    }
}
