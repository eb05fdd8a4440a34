/// Websocket integration tests
///
/// The router is served on an ephemeral port and driven with
/// tokio-tungstenite.

mod common;

use std::time::Duration;

use berth_api::app::build_router;
use common::TestContext;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(ctx: &TestContext) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(ctx.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}", addr)
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next text frame as JSON, or `None` once the server closed
async fn next_event(socket: &mut Socket) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn connect_authenticated(base: &str, path: &str, token: &str) -> Socket {
    let (mut socket, _) = connect_async(format!("{}{}", base, path)).await.unwrap();
    send(&mut socket, json!({ "type": "auth", "token": token })).await;
    let reply = next_event(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "auth-success", "{}", reply);
    socket
}

#[tokio::test]
async fn test_room_socket_receives_history_and_live_messages() {
    let ctx = TestContext::new();
    let room_id = ctx.create_room("alice", "general", true).await;
    ctx.post(
        &format!("/rooms/{room_id}/message"),
        "alice",
        json!({ "text": "before" }),
    )
    .await;

    let base = serve(&ctx).await;
    let mut socket = connect_authenticated(
        &base,
        &format!("/ws/rooms/{room_id}"),
        &ctx.token("alice", "alice"),
    )
    .await;

    let initial = next_event(&mut socket).await.unwrap();
    assert_eq!(initial["type"], "initial_messages");
    assert_eq!(initial["messages"][0]["text"], "before");

    // Posted over REST, delivered over the socket
    ctx.post(
        &format!("/rooms/{room_id}/message"),
        "alice",
        json!({ "text": "via rest" }),
    )
    .await;
    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["type"], "message");
    assert_eq!(event["text"], "via rest");

    // Posted over the socket, echoed through the room channel
    send(&mut socket, json!({ "type": "message", "text": "via socket" })).await;
    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["type"], "message");
    assert_eq!(event["text"], "via socket");
    assert_eq!(event["sender"], "alice");

    send(&mut socket, json!({ "type": "ping" })).await;
    assert_eq!(next_event(&mut socket).await.unwrap()["type"], "pong");

    // Garbage is ignored, the socket stays usable
    socket.send(Message::Text("{not json".to_string())).await.unwrap();
    send(&mut socket, json!({ "type": "ping" })).await;
    assert_eq!(next_event(&mut socket).await.unwrap()["type"], "pong");

    let history = ctx
        .state
        .chat
        .recent_messages(room_id.parse().unwrap(), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_bad_token_gets_auth_failure_and_close() {
    let ctx = TestContext::new();
    let base = serve(&ctx).await;

    let (mut socket, _) = connect_async(format!("{}/ws", base)).await.unwrap();
    send(&mut socket, json!({ "type": "auth", "token": "garbage" })).await;

    let reply = next_event(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "auth-failure");

    let close = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap();
    match close {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_frame_must_be_auth() {
    let ctx = TestContext::new();
    let base = serve(&ctx).await;

    let (mut socket, _) = connect_async(format!("{}/ws", base)).await.unwrap();
    send(&mut socket, json!({ "type": "ping" })).await;

    let reply = next_event(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "auth-failure");
    assert!(next_event(&mut socket).await.is_none());
}

#[tokio::test]
async fn test_auth_deadline() {
    let mut config = berth_api::config::Config::in_memory(common::TEST_SECRET);
    config.chat.ws_auth_timeout_secs = 1;
    let ctx = TestContext::with_config(config);
    let base = serve(&ctx).await;

    let (mut socket, _) = connect_async(format!("{}/ws", base)).await.unwrap();
    let reply = next_event(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "auth-failure");
    assert_eq!(reply["message"], "Authentication timed out");
}

#[tokio::test]
async fn test_non_member_cannot_open_private_room_socket() {
    let ctx = TestContext::new();
    let room_id = ctx.create_room("alice", "ops", false).await;
    let base = serve(&ctx).await;

    let (mut socket, _) = connect_async(format!("{}/ws/rooms/{}", base, room_id))
        .await
        .unwrap();
    send(
        &mut socket,
        json!({ "type": "auth", "token": ctx.token("mallory", "mallory") }),
    )
    .await;
    let reply = next_event(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "auth-failure");
}

#[tokio::test]
async fn test_user_socket_receives_invite_notification() {
    let ctx = TestContext::new();
    let room_id = ctx.create_room("alice", "ops", false).await;
    let base = serve(&ctx).await;

    let mut socket = connect_authenticated(&base, "/ws", &ctx.token("bob", "bob")).await;

    let target = berth_shared::redis::keys::ChannelTarget::User("bob".to_string());
    common::wait_for(|| async { ctx.state.hub.subscriber_count(&target) == 1 }, 5)
        .await
        .unwrap();

    ctx.post(
        &format!("/rooms/{room_id}/invite?user_id=bob"),
        "alice",
        json!({}),
    )
    .await;

    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["type"], "notification");
    assert_eq!(event["notification"]["type"], "room_invite");
    assert_eq!(event["notification"]["room_name"], "ops");

    socket.close(None).await.unwrap();
    common::wait_for(|| async { ctx.state.hub.channel_count() == 0 }, 5)
        .await
        .unwrap();
}
