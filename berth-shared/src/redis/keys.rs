//! Key and channel names

use uuid::Uuid;

pub const PREFIX: &str = "berth";

/// Pattern matching every event channel
pub const EVENTS_PATTERN: &str = "berth:events:*";

pub fn room(id: Uuid) -> String {
    format!("{PREFIX}:room:{id}")
}

pub fn room_members(id: Uuid) -> String {
    format!("{PREFIX}:room:{id}:members")
}

pub fn room_admins(id: Uuid) -> String {
    format!("{PREFIX}:room:{id}:admins")
}

pub fn room_invites(id: Uuid) -> String {
    format!("{PREFIX}:room:{id}:invites")
}

pub fn room_messages(id: Uuid) -> String {
    format!("{PREFIX}:room:{id}:messages")
}

pub fn public_rooms() -> String {
    format!("{PREFIX}:rooms:public")
}

pub fn user_rooms(sub: &str) -> String {
    format!("{PREFIX}:user:{sub}:rooms")
}

pub fn user_notifications(sub: &str) -> String {
    format!("{PREFIX}:user:{sub}:notifications")
}

pub fn room_channel(id: Uuid) -> String {
    format!("{PREFIX}:events:room:{id}")
}

pub fn user_channel(sub: &str) -> String {
    format!("{PREFIX}:events:user:{sub}")
}

/// Target of an event channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    Room(Uuid),
    User(String),
}

impl ChannelTarget {
    pub fn channel(&self) -> String {
        match self {
            ChannelTarget::Room(id) => room_channel(*id),
            ChannelTarget::User(sub) => user_channel(sub),
        }
    }

    /// Parses a channel name produced by [`ChannelTarget::channel`]
    pub fn parse(channel: &str) -> Option<Self> {
        let rest = channel.strip_prefix(PREFIX)?.strip_prefix(":events:")?;
        if let Some(id) = rest.strip_prefix("room:") {
            return Uuid::parse_str(id).ok().map(ChannelTarget::Room);
        }
        rest.strip_prefix("user:")
            .filter(|sub| !sub.is_empty())
            .map(|sub| ChannelTarget::User(sub.to_string()))
    }
}
