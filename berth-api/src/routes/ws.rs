/// Websocket endpoints
///
/// # Endpoints
///
/// - `GET /ws` - User socket, receives notifications
/// - `GET /ws/rooms/:id` - Room socket, receives room events and accepts messages
///
/// # Protocol
///
/// ```text
/// client                                server
///   │ {"type":"auth","token":"..."}        │   first frame, before the deadline
///   │ ───────────────────────────────────> │
///   │        {"type":"auth-success",...}   │   or auth-failure + close 1008
///   │ <─────────────────────────────────── │
///   │    {"type":"initial_messages",...}   │   room sockets only
///   │ <─────────────────────────────────── │
///   │ {"type":"message","text":"hi"}       │   room sockets only
///   │ {"type":"auth","token":"..."}        │   token refresh
///   │ {"type":"ping"}                      │   answered with pong
/// ```
///
/// Unparseable frames are logged and ignored.

use std::borrow::Cow;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use berth_shared::{
    auth::AuthContext,
    events::{ClientEvent, ServerEvent},
    redis::keys::ChannelTarget,
};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{
    app::AppState,
    chat::service::{self, PostMessageRequest},
    error::ApiResult,
    routes::load_room,
};

/// What a socket is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketScope {
    User,
    Room(Uuid),
}

/// User socket
pub async fn user_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_socket(state, socket, SocketScope::User))
}

/// Room socket
///
/// Unknown rooms are rejected with 404 before the upgrade; membership is
/// checked once the socket has authenticated.
pub async fn room_socket(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    load_room(&state, room_id).await?;
    Ok(ws.on_upgrade(move |socket| run_socket(state, socket, SocketScope::Room(room_id))))
}

/// Result of the auth handshake
enum AuthOutcome {
    Authenticated(AuthContext),
    Rejected(String),
    /// Peer went away; nothing left to tell it
    Closed,
}

async fn run_socket(state: AppState, mut socket: WebSocket, scope: SocketScope) {
    let deadline = Duration::from_secs(state.config.chat.ws_auth_timeout_secs);

    let outcome = match tokio::time::timeout(deadline, wait_for_auth(&state, &mut socket)).await {
        Ok(outcome) => outcome,
        Err(_) => AuthOutcome::Rejected("Authentication timed out".to_string()),
    };

    let mut auth = match outcome {
        AuthOutcome::Authenticated(auth) => auth,
        AuthOutcome::Rejected(message) => {
            tracing::debug!(?scope, reason = %message, "Websocket authentication failed");
            reject(&mut socket, message).await;
            return;
        }
        AuthOutcome::Closed => return,
    };

    if let SocketScope::Room(room_id) = scope {
        match state.chat.is_member(room_id, &auth.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                reject(&mut socket, "Not a member of this room".to_string()).await;
                return;
            }
            Err(e) => {
                tracing::error!(room_id = %room_id, error = %e, "Membership check failed");
                reject(&mut socket, "Membership check failed".to_string()).await;
                return;
            }
        }
    }

    let target = match scope {
        SocketScope::User => ChannelTarget::User(auth.user_id.clone()),
        SocketScope::Room(room_id) => ChannelTarget::Room(room_id),
    };

    // Subscribe before loading history so nothing posted in between is missed
    let mut events = match &target {
        ChannelTarget::User(user_id) => state.hub.subscribe_user(user_id),
        ChannelTarget::Room(room_id) => state.hub.subscribe_room(*room_id),
    };

    tracing::info!(?scope, user_id = %auth.user_id, "Websocket connected");

    if !send_event(&mut socket, &auth_success(&auth)).await {
        drop(events);
        state.hub.release(&target);
        return;
    }

    if let SocketScope::Room(room_id) = scope {
        let initial = state
            .chat
            .recent_messages(room_id, state.config.chat.initial_messages)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(room_id = %room_id, error = %e, "Failed to load recent messages");
                Vec::new()
            });
        if !send_event(&mut socket, &ServerEvent::InitialMessages { messages: initial }).await {
            drop(events);
            state.hub.release(&target);
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let removed = matches!(
                        (&event, scope),
                        (ServerEvent::MemberLeft { user_id, .. }, SocketScope::Room(_))
                            if *user_id == auth.user_id
                    );
                    if !send_event(&mut socket, &event).await || removed {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(?scope, user_id = %auth.user_id, skipped, "Websocket lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            frame = socket.recv() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match handle_frame(&state, scope, &mut auth, &text).await {
                        FrameResult::Reply(event) => {
                            if !send_event(&mut socket, &event).await {
                                break;
                            }
                        }
                        FrameResult::Ignore => {}
                        FrameResult::Reject(message) => {
                            reject(&mut socket, message).await;
                            break;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(?scope, error = %e, "Websocket receive failed");
                    break;
                }
            },
        }
    }

    drop(events);
    state.hub.release(&target);
    tracing::info!(?scope, user_id = %auth.user_id, "Websocket disconnected");
}

/// Reads frames until the first text frame and verifies it as an auth frame
async fn wait_for_auth(state: &AppState, socket: &mut WebSocket) -> AuthOutcome {
    loop {
        match socket.recv().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match ClientEvent::parse(&text) {
                    Ok(ClientEvent::Auth { token }) => match state.verifier.verify(&token).await {
                        Ok(claims) => AuthOutcome::Authenticated(AuthContext::from_claims(claims)),
                        Err(e) => AuthOutcome::Rejected(format!("Invalid token: {}", e)),
                    },
                    Ok(_) => AuthOutcome::Rejected("First frame must be an auth frame".to_string()),
                    Err(_) => AuthOutcome::Rejected("Malformed auth frame".to_string()),
                };
            }
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return AuthOutcome::Closed,
            Some(Ok(_)) => continue,
        }
    }
}

enum FrameResult {
    Reply(ServerEvent),
    Ignore,
    Reject(String),
}

async fn handle_frame(
    state: &AppState,
    scope: SocketScope,
    auth: &mut AuthContext,
    text: &str,
) -> FrameResult {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(user_id = %auth.user_id, error = %e, "Ignoring unparseable frame");
            return FrameResult::Ignore;
        }
    };

    match event {
        ClientEvent::Ping => FrameResult::Reply(ServerEvent::Pong),
        ClientEvent::Auth { token } => match state.verifier.verify(&token).await {
            Ok(claims) if claims.sub == auth.user_id => {
                *auth = AuthContext::from_claims(claims);
                FrameResult::Reply(auth_success(auth))
            }
            Ok(_) => FrameResult::Reject("Token belongs to another user".to_string()),
            Err(e) => FrameResult::Reject(format!("Invalid token: {}", e)),
        },
        ClientEvent::Message { text, attachment } => {
            let SocketScope::Room(room_id) = scope else {
                return FrameResult::Reply(ServerEvent::error(
                    "Messages can only be sent on room sockets",
                ));
            };
            // The stored message reaches this socket through the room channel
            match service::post_message(state, room_id, auth, PostMessageRequest { text, attachment })
                .await
            {
                Ok(_) => FrameResult::Ignore,
                Err(e) => FrameResult::Reply(ServerEvent::error(e.to_string())),
            }
        }
    }
}

fn auth_success(auth: &AuthContext) -> ServerEvent {
    ServerEvent::AuthSuccess {
        user_id: auth.user_id.clone(),
        username: auth.username.clone(),
    }
}

/// Returns false when the peer is gone
async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> bool {
    let json = match event.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            return true;
        }
    };
    socket.send(WsMessage::Text(json)).await.is_ok()
}

/// Sends `auth-failure` and closes with a policy violation
async fn reject(socket: &mut WebSocket, message: String) {
    send_event(
        socket,
        &ServerEvent::AuthFailure {
            message: message.clone(),
        },
    )
    .await;

    let reason: String = message.chars().take(120).collect();
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Cow::Owned(reason),
        })))
        .await;
}
