/// Chat room model
///
/// A room is a named channel with three relation sets kept next to it in the
/// key-value store: members, admins and pending invites. The creator starts
/// out as both member and admin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,

    pub name: String,

    /// Public rooms are listed in `GET /rooms` and can be joined without invite
    pub is_public: bool,

    /// Subject of the creating user
    pub created_by: String,

    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Builds a new room with a fresh ID
    pub fn new(data: CreateRoom) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name,
            is_public: data.is_public,
            created_by: data.created_by,
            created_at: Utc::now(),
        }
    }
}

/// Input for creating a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoom {
    pub name: String,
    pub is_public: bool,
    pub created_by: String,
}

/// Input for updating a room
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRoom {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

impl UpdateRoom {
    pub fn apply_to(self, room: &mut Room) {
        if let Some(name) = self.name {
            room.name = name;
        }
        if let Some(is_public) = self.is_public {
            room.is_public = is_public;
        }
    }
}

/// Membership view of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub user_id: String,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_room() {
        let room = Room::new(CreateRoom {
            name: "general".to_string(),
            is_public: true,
            created_by: "sub-1".to_string(),
        });
        assert_eq!(room.name, "general");
        assert!(room.is_public);
        assert_eq!(room.created_by, "sub-1");
    }

    #[test]
    fn test_update_room_partial() {
        let mut room = Room::new(CreateRoom {
            name: "general".to_string(),
            is_public: true,
            created_by: "sub-1".to_string(),
        });

        UpdateRoom {
            is_public: Some(false),
            ..Default::default()
        }
        .apply_to(&mut room);

        assert_eq!(room.name, "general");
        assert!(!room.is_public);
    }
}
