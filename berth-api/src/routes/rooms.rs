/// Room endpoints
///
/// Rooms carry three relation sets: members, admins and pending invites.
/// Membership changes are published to the room channel; invites, removals
/// and admin grants also notify the affected user.
///
/// # Endpoints
///
/// - `POST /rooms` - Create room
/// - `GET /rooms` - List public rooms
/// - `GET /user/rooms` - List the caller's rooms
/// - `GET /rooms/:id` - Room detail
/// - `PUT /rooms/:id` - Rename or change visibility (admin)
/// - `POST /rooms/:id/join` - Join a public room or accept an invite
/// - `POST /rooms/:id/leave` - Leave
/// - `GET /rooms/:id/members` - Members with admin flag
/// - `POST /rooms/:id/invite?user_id=` - Invite (admin)
/// - `DELETE /rooms/:id/members/:user_id` - Remove member (admin or self)
/// - `POST /rooms/:id/admins/:user_id` - Grant admin (admin)
/// - `DELETE /rooms/:id/admins/:user_id` - Revoke admin (admin)

use crate::{
    app::AppState,
    chat::service::{broadcast, not_blank, notify},
    error::{ApiError, ApiResult},
    routes::{load_room, require_admin},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use berth_shared::{
    auth::AuthContext,
    events::{BusEvent, ServerEvent},
    models::{CreateRoom, Notification, NotificationKind, Room, RoomMember, UpdateRoom},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Create room request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(
        length(min = 1, max = 80, message = "Name must be 1-80 characters"),
        custom(function = "not_blank")
    )]
    pub name: String,

    #[serde(rename = "isPublic", alias = "is_public", default)]
    pub is_public: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: Uuid,
}

/// Update room request
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateRoomRequest {
    #[validate(
        length(min = 1, max = 80, message = "Name must be 1-80 characters"),
        custom(function = "not_blank")
    )]
    pub name: Option<String>,

    #[serde(rename = "isPublic", alias = "is_public", default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<Room>,
}

/// Room detail with the caller's relation to it
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,

    pub member_count: usize,

    pub is_member: bool,

    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<RoomMember>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub room_id: Uuid,

    pub user_id: String,

    /// False when the request changed nothing
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct InviteQuery {
    pub user_id: String,
}

/// Fails with 409 if `user_id` is the only admin and would leave others behind
async fn ensure_not_last_admin(state: &AppState, room_id: Uuid, user_id: &str) -> ApiResult<()> {
    let admins = state.chat.admins(room_id).await?;
    if admins.len() != 1 || admins[0] != user_id {
        return Ok(());
    }

    let members = state.chat.members(room_id).await?;
    if members.iter().any(|m| m != user_id) {
        return Err(ApiError::Conflict(
            "The last admin cannot leave while other members remain; grant admin to someone first"
                .to_string(),
        ));
    }
    Ok(())
}

/// Create room
///
/// The creator becomes the first member and admin.
///
/// # Endpoint
///
/// ```text
/// POST /rooms
/// Authorization: Bearer <token>
/// Content-Type: application/json
///
/// { "name": "general", "isPublic": true }
/// ```
///
/// # Response
///
/// ```json
/// { "room_id": "2b1c..." }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Name empty or longer than 80 characters
pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<CreateRoomResponse>)> {
    req.validate()?;

    let room = Room::new(CreateRoom {
        name: req.name.trim().to_string(),
        is_public: req.is_public,
        created_by: auth.user_id.clone(),
    });
    state.chat.create_room(&room).await?;

    tracing::info!(
        room_id = %room.id,
        name = %room.name,
        is_public = room.is_public,
        created_by = %auth.user_id,
        "Room created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse { room_id: room.id }),
    ))
}

/// List public rooms, oldest first
pub async fn list_public_rooms(State(state): State<AppState>) -> ApiResult<Json<RoomListResponse>> {
    let rooms = state.chat.list_public_rooms().await?;
    Ok(Json(RoomListResponse { rooms }))
}

/// List the rooms the caller belongs to
pub async fn list_user_rooms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<RoomListResponse>> {
    let rooms = state.chat.list_user_rooms(&auth.user_id).await?;
    Ok(Json(RoomListResponse { rooms }))
}

/// Room detail
///
/// Private rooms are only visible to members; others get 404.
pub async fn get_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<RoomDetail>> {
    let room = load_room(&state, room_id).await?;
    let is_member = state.chat.is_member(room_id, &auth.user_id).await?;
    if !room.is_public && !is_member {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }

    let is_admin = state.chat.is_admin(room_id, &auth.user_id).await?;
    let member_count = state.chat.members(room_id).await?.len();

    Ok(Json(RoomDetail {
        room,
        member_count,
        is_member,
        is_admin,
    }))
}

/// Rename a room or change its visibility
///
/// # Endpoint
///
/// ```text
/// PUT /rooms/:id
///
/// { "name": "ops", "isPublic": false }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: No fields given
/// - `403 Forbidden`: Caller is not an admin
pub async fn update_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UpdateRoomRequest>,
) -> ApiResult<Json<Room>> {
    req.validate()?;
    if req.name.is_none() && req.is_public.is_none() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let mut room = load_room(&state, room_id).await?;
    require_admin(&state, room_id, &auth.user_id).await?;

    UpdateRoom {
        name: req.name.map(|n| n.trim().to_string()),
        is_public: req.is_public,
    }
    .apply_to(&mut room);
    state.chat.update_room(&room).await?;

    tracing::info!(room_id = %room_id, by = %auth.user_id, "Room updated");
    broadcast(
        &state,
        BusEvent::room(room_id, ServerEvent::RoomUpdated { room: room.clone() }),
    )
    .await;

    Ok(Json(room))
}

/// Join a room
///
/// Public rooms are open to anyone. Private rooms need a pending invite,
/// which is consumed.
///
/// # Errors
///
/// - `403 Forbidden`: Private room without invite
/// - `404 Not Found`: Unknown room
pub async fn join_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<MembershipResponse>> {
    let room = load_room(&state, room_id).await?;

    if state.chat.is_member(room_id, &auth.user_id).await? {
        return Ok(Json(MembershipResponse {
            room_id,
            user_id: auth.user_id,
            changed: false,
        }));
    }

    if !room.is_public && !state.chat.take_invite(room_id, &auth.user_id).await? {
        return Err(ApiError::Forbidden(
            "This room is private and requires an invite".to_string(),
        ));
    }

    let changed = state.chat.add_member(room_id, &auth.user_id).await?;
    if changed {
        tracing::info!(room_id = %room_id, user_id = %auth.user_id, "Member joined");
        broadcast(
            &state,
            BusEvent::room(
                room_id,
                ServerEvent::MemberJoined {
                    room_id,
                    user_id: auth.user_id.clone(),
                    username: auth.username.clone(),
                },
            ),
        )
        .await;
    }

    Ok(Json(MembershipResponse {
        room_id,
        user_id: auth.user_id,
        changed,
    }))
}

/// Leave a room
///
/// # Errors
///
/// - `404 Not Found`: Unknown room or caller is not a member
/// - `409 Conflict`: Caller is the last admin and other members remain
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<MembershipResponse>> {
    load_room(&state, room_id).await?;
    remove_from_room(&state, room_id, &auth.user_id).await?;

    Ok(Json(MembershipResponse {
        room_id,
        user_id: auth.user_id,
        changed: true,
    }))
}

async fn remove_from_room(state: &AppState, room_id: Uuid, user_id: &str) -> ApiResult<()> {
    if !state.chat.is_member(room_id, user_id).await? {
        return Err(ApiError::NotFound("Not a member of this room".to_string()));
    }
    ensure_not_last_admin(state, room_id, user_id).await?;

    state.chat.remove_member(room_id, user_id).await?;
    tracing::info!(room_id = %room_id, user_id = %user_id, "Member left");

    broadcast(
        state,
        BusEvent::room(
            room_id,
            ServerEvent::MemberLeft {
                room_id,
                user_id: user_id.to_string(),
            },
        ),
    )
    .await;
    Ok(())
}

/// List members with their admin flag
///
/// Visible to members, and to anyone for public rooms.
pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<MembersResponse>> {
    let room = load_room(&state, room_id).await?;
    let members = state.chat.members(room_id).await?;
    if !room.is_public && !members.contains(&auth.user_id) {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }

    let admins = state.chat.admins(room_id).await?;
    let members = members
        .into_iter()
        .map(|user_id| RoomMember {
            is_admin: admins.contains(&user_id),
            user_id,
        })
        .collect();

    Ok(Json(MembersResponse { members }))
}

/// Invite a user
///
/// # Endpoint
///
/// ```text
/// POST /rooms/:id/invite?user_id=<sub>
/// ```
///
/// Records a pending invite and sends the user a `room_invite`
/// notification.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin
/// - `409 Conflict`: User is already a member
pub async fn invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<InviteQuery>,
) -> ApiResult<Json<MembershipResponse>> {
    let invitee = query.user_id.trim();
    if invitee.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }

    let room = load_room(&state, room_id).await?;
    require_admin(&state, room_id, &auth.user_id).await?;

    if state.chat.is_member(room_id, invitee).await? {
        return Err(ApiError::Conflict(
            "User is already a member of this room".to_string(),
        ));
    }

    state.chat.add_invite(room_id, invitee).await?;
    notify(
        &state,
        invitee,
        Notification::new(NotificationKind::RoomInvite, room_id, &room.name, &auth.user_id),
    )
    .await?;

    tracing::info!(room_id = %room_id, invitee = %invitee, by = %auth.user_id, "User invited");

    Ok(Json(MembershipResponse {
        room_id,
        user_id: invitee.to_string(),
        changed: true,
    }))
}

/// Remove a member
///
/// Admins may remove anyone; any member may remove themselves.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is neither an admin nor the target
/// - `404 Not Found`: Target is not a member
/// - `409 Conflict`: Target is the last admin and other members remain
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((room_id, user_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<MembershipResponse>> {
    let room = load_room(&state, room_id).await?;
    let is_self = user_id == auth.user_id;
    if !is_self {
        require_admin(&state, room_id, &auth.user_id).await?;
    }

    remove_from_room(&state, room_id, &user_id).await?;

    if !is_self {
        notify(
            &state,
            &user_id,
            Notification::new(
                NotificationKind::RemovedFromRoom,
                room_id,
                &room.name,
                &auth.user_id,
            ),
        )
        .await?;
    }

    Ok(Json(MembershipResponse {
        room_id,
        user_id,
        changed: true,
    }))
}

/// Grant admin rights to a member
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin
/// - `409 Conflict`: Target is not a member
pub async fn grant_admin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((room_id, user_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<MembershipResponse>> {
    let room = load_room(&state, room_id).await?;
    require_admin(&state, room_id, &auth.user_id).await?;

    let changed = state.chat.add_admin(room_id, &user_id).await?;
    if changed {
        tracing::info!(room_id = %room_id, user_id = %user_id, by = %auth.user_id, "Admin granted");
        notify(
            &state,
            &user_id,
            Notification::new(
                NotificationKind::AdminGranted,
                room_id,
                &room.name,
                &auth.user_id,
            ),
        )
        .await?;
    }

    Ok(Json(MembershipResponse {
        room_id,
        user_id,
        changed,
    }))
}

/// Revoke admin rights
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin
/// - `404 Not Found`: Target is not an admin
/// - `409 Conflict`: Target is the last admin
pub async fn revoke_admin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((room_id, user_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<MembershipResponse>> {
    load_room(&state, room_id).await?;
    require_admin(&state, room_id, &auth.user_id).await?;

    let admins = state.chat.admins(room_id).await?;
    if !admins.contains(&user_id) {
        return Err(ApiError::NotFound("User is not an admin of this room".to_string()));
    }
    if admins.len() == 1 {
        return Err(ApiError::Conflict(
            "A room must keep at least one admin".to_string(),
        ));
    }

    state.chat.remove_admin(room_id, &user_id).await?;
    tracing::info!(room_id = %room_id, user_id = %user_id, by = %auth.user_id, "Admin revoked");

    Ok(Json(MembershipResponse {
        room_id,
        user_id,
        changed: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_accepts_both_spellings() {
        let camel: CreateRoomRequest =
            serde_json::from_str(r#"{"name":"general","isPublic":true}"#).unwrap();
        assert!(camel.is_public);

        let snake: CreateRoomRequest =
            serde_json::from_str(r#"{"name":"general","is_public":true}"#).unwrap();
        assert!(snake.is_public);

        let private: CreateRoomRequest = serde_json::from_str(r#"{"name":"ops"}"#).unwrap();
        assert!(!private.is_public);
    }

    #[test]
    fn test_room_name_length() {
        let req = CreateRoomRequest {
            name: "x".repeat(81),
            is_public: true,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_blank_room_name_is_invalid() {
        let req = CreateRoomRequest {
            name: "   ".to_string(),
            is_public: true,
        };
        assert!(req.validate().is_err());

        let update = UpdateRoomRequest {
            name: Some("\t".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
        assert!(UpdateRoomRequest::default().validate().is_ok());
    }

    #[test]
    fn test_room_detail_flattens_room() {
        let room = Room::new(CreateRoom {
            name: "general".to_string(),
            is_public: true,
            created_by: "alice".to_string(),
        });
        let detail = RoomDetail {
            room,
            member_count: 1,
            is_member: true,
            is_admin: true,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["name"], "general");
        assert_eq!(json["member_count"], 1);
    }
}
