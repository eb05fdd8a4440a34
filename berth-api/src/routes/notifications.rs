/// Notification endpoints
///
/// - `GET /notifications` - Caller's notifications, newest first
/// - `POST /notifications/:id/read` - Mark one as read

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use berth_shared::{auth::AuthContext, models::Notification};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,

    pub unread: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub id: Uuid,
    pub read: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<NotificationsResponse>> {
    let notifications = state.chat.notifications(&auth.user_id).await?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(NotificationsResponse {
        notifications,
        unread,
    }))
}

/// # Errors
///
/// - `404 Not Found`: No such notification for the caller
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MarkReadResponse>> {
    if !state.chat.mark_notification_read(&auth.user_id, id).await? {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(MarkReadResponse { id, read: true }))
}
