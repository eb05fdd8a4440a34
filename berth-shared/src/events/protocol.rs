use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Attachment, Message, Notification, Room};
use crate::redis::keys::{self, ChannelTarget};

/// Frames sent to websocket clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename = "auth-success")]
    AuthSuccess { user_id: String, username: String },

    /// Sent right before the socket is closed with a policy violation
    #[serde(rename = "auth-failure")]
    AuthFailure { message: String },

    /// Recent history, sent once after a room socket authenticates
    InitialMessages { messages: Vec<Message> },

    /// A new message; message fields sit next to `type`
    Message(Message),

    MemberJoined {
        room_id: Uuid,
        user_id: String,
        username: String,
    },

    MemberLeft { room_id: Uuid, user_id: String },

    RoomUpdated { room: Room },

    Notification { notification: Notification },

    Pong,

    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// # Errors
    ///
    /// Fails only if a contained value cannot be represented as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from websocket clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First frame on every socket; later frames refresh the token
    Auth { token: String },

    Message {
        text: String,
        #[serde(default)]
        attachment: Option<Attachment>,
    },

    Ping,
}

impl ClientEvent {
    /// # Errors
    ///
    /// Returns the decode error for malformed or unknown frames.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// A server event addressed to a pub/sub channel
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub channel: String,
    pub event: ServerEvent,
}

impl BusEvent {
    pub fn room(room_id: Uuid, event: ServerEvent) -> Self {
        Self {
            channel: keys::room_channel(room_id),
            event,
        }
    }

    pub fn user(user_id: &str, event: ServerEvent) -> Self {
        Self {
            channel: keys::user_channel(user_id),
            event,
        }
    }

    /// Rebuilds an event received from pub/sub
    ///
    /// # Errors
    ///
    /// Returns the decode error if the payload is not a server event.
    pub fn from_parts(channel: impl Into<String>, payload: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            channel: channel.into(),
            event: serde_json::from_str(payload)?,
        })
    }

    /// JSON body published on the channel
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        self.event.to_json()
    }

    pub fn target(&self) -> Option<ChannelTarget> {
        ChannelTarget::parse(&self.channel)
    }
}
