/// Message endpoints
///
/// # Endpoints
///
/// - `GET /rooms/:id/messages?since=&lang=&limit=` - History, oldest first
/// - `POST /rooms/:id/message` - Post a message

use crate::{
    app::AppState,
    chat::service::{self, PostMessageRequest},
    error::{ApiError, ApiResult},
    routes::load_room,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use berth_shared::{auth::AuthContext, models::Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// History query
///
/// `since` is an RFC 3339 timestamp and is inclusive.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub since: Option<String>,

    /// Language code; `text` is replaced by its translation when available
    pub lang: Option<String>,

    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn since(&self) -> ApiResult<Option<DateTime<Utc>>> {
        match self.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| {
                    ApiError::BadRequest(format!(
                        "Invalid since timestamp '{}', expected RFC 3339",
                        raw
                    ))
                }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
}

/// Room history
///
/// # Endpoint
///
/// ```text
/// GET /rooms/:id/messages?since=2025-01-03T12:00:00Z&lang=fr&limit=50
/// Authorization: Bearer <token>
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: `since` is not RFC 3339
/// - `404 Not Found`: Unknown room, or private room and caller is not a member
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let since = query.since()?;

    let room = load_room(&state, room_id).await?;
    if !room.is_public && !state.chat.is_member(room_id, &auth.user_id).await? {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }

    let limit = query
        .limit
        .map(|l| l.clamp(1, state.config.chat.history_limit.max(1)));
    let mut messages = state.chat.messages(room_id, since, limit).await?;

    if let Some(lang) = query.lang.as_deref().filter(|l| !l.is_empty()) {
        for message in &mut messages {
            let text = message.text_in(lang).to_string();
            message.text = text;
        }
    }

    Ok(Json(HistoryResponse { messages }))
}

/// Post a message
///
/// # Endpoint
///
/// ```text
/// POST /rooms/:id/message
/// Authorization: Bearer <token>
/// Content-Type: application/json
///
/// { "text": "hello", "attachment": null }
/// ```
///
/// # Response
///
/// `201 Created` with the stored message, including server timestamp and,
/// when translation is enabled, `metadata`.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not a member
/// - `404 Not Found`: Unknown room
/// - `422 Unprocessable Entity`: Text empty or longer than 4000 characters
pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = service::post_message(&state, room_id, &auth, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
