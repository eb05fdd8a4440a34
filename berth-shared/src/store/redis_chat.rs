/// Redis-backed chat store
///
/// Uses the key layout documented in [`crate::redis`]. Writes that touch more
/// than one key go through a `MULTI` pipeline, so a reader never sees a member
/// without its user-room mirror.
///
/// # Example
///
/// ```no_run
/// use berth_shared::redis::{RedisClient, RedisConfig};
/// use berth_shared::store::{ChatStore, RedisChatStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// let store = RedisChatStore::new(client, 1000);
/// let rooms = store.list_public_rooms().await?;
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use uuid::Uuid;

use super::{window, ChatStore, StoreError};
use crate::models::{Message, Notification, Room};
use crate::redis::{keys, RedisClient};

pub struct RedisChatStore {
    client: RedisClient,
    history_limit: usize,
}

impl RedisChatStore {
    pub fn new(client: RedisClient, history_limit: usize) -> Self {
        Self {
            client,
            history_limit: history_limit.max(1),
        }
    }

    fn room_fields(room: &Room) -> Vec<(&'static str, String)> {
        vec![
            ("name", room.name.clone()),
            ("is_public", if room.is_public { "1" } else { "0" }.to_string()),
            ("created_by", room.created_by.clone()),
            ("created_at", room.created_at.to_rfc3339()),
        ]
    }

    fn parse_room(id: Uuid, fields: HashMap<String, String>) -> Result<Option<Room>, StoreError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("Room {} has no {}", id, name)))
        };

        let created_at = DateTime::parse_from_rfc3339(&field("created_at")?)
            .map_err(|e| StoreError::Corrupt(format!("Room {} created_at: {}", id, e)))?
            .with_timezone(&Utc);

        Ok(Some(Room {
            id,
            name: field("name")?,
            is_public: field("is_public")? == "1",
            created_by: field("created_by")?,
            created_at,
        }))
    }

    async fn rooms_by_ids(&self, ids: Vec<String>) -> Result<Vec<Room>, StoreError> {
        let mut rooms = Vec::with_capacity(ids.len());
        for raw in ids {
            let Ok(id) = Uuid::parse_str(&raw) else {
                tracing::warn!(room_id = %raw, "Skipping malformed room id");
                continue;
            };
            if let Some(room) = self.get_room(id).await? {
                rooms.push(room);
            }
        }
        rooms.sort_by_key(|r| r.created_at);
        Ok(rooms)
    }

    fn decode_messages(raw: Vec<String>) -> Vec<Message> {
        raw.into_iter()
            .filter_map(|json| match serde_json::from_str(&json) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable message");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl ChatStore for RedisChatStore {
    async fn create_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection();

        let exists: bool = conn.exists(keys::room(room.id)).await?;
        if exists {
            return Err(StoreError::Conflict(format!("Room {} exists", room.id)));
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(keys::room(room.id), Self::room_fields(room).as_slice())
            .ignore()
            .sadd(keys::room_members(room.id), &room.created_by)
            .ignore()
            .sadd(keys::room_admins(room.id), &room.created_by)
            .ignore()
            .sadd(keys::user_rooms(&room.created_by), room.id.to_string())
            .ignore();
        if room.is_public {
            pipe.sadd(keys::public_rooms(), room.id.to_string()).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, StoreError> {
        let mut conn = self.client.get_connection();
        let fields: HashMap<String, String> = conn.hgetall(keys::room(id)).await?;
        Self::parse_room(id, fields)
    }

    async fn update_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection();

        let exists: bool = conn.exists(keys::room(room.id)).await?;
        if !exists {
            return Err(StoreError::NotFound(format!("Room {}", room.id)));
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(keys::room(room.id), "name", &room.name)
            .ignore()
            .hset(
                keys::room(room.id),
                "is_public",
                if room.is_public { "1" } else { "0" },
            )
            .ignore();
        if room.is_public {
            pipe.sadd(keys::public_rooms(), room.id.to_string()).ignore();
        } else {
            pipe.srem(keys::public_rooms(), room.id.to_string()).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    async fn list_public_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let mut conn = self.client.get_connection();
        let ids: Vec<String> = conn.smembers(keys::public_rooms()).await?;
        self.rooms_by_ids(ids).await
    }

    async fn list_user_rooms(&self, user_id: &str) -> Result<Vec<Room>, StoreError> {
        let mut conn = self.client.get_connection();
        let ids: Vec<String> = conn.smembers(keys::user_rooms(user_id)).await?;
        self.rooms_by_ids(ids).await
    }

    async fn members(&self, room_id: Uuid) -> Result<Vec<String>, StoreError> {
        let mut conn = self.client.get_connection();
        let mut members: Vec<String> = conn.smembers(keys::room_members(room_id)).await?;
        members.sort();
        Ok(members)
    }

    async fn admins(&self, room_id: Uuid) -> Result<Vec<String>, StoreError> {
        let mut conn = self.client.get_connection();
        let mut admins: Vec<String> = conn.smembers(keys::room_admins(room_id)).await?;
        admins.sort();
        Ok(admins)
    }

    async fn is_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        Ok(conn.sismember(keys::room_members(room_id), user_id).await?)
    }

    async fn is_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        Ok(conn.sismember(keys::room_admins(room_id), user_id).await?)
    }

    async fn add_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        let (added, _): (i64, i64) = redis::pipe()
            .atomic()
            .sadd(keys::room_members(room_id), user_id)
            .sadd(keys::user_rooms(user_id), room_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(added > 0)
    }

    async fn remove_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        let (removed, _, _): (i64, i64, i64) = redis::pipe()
            .atomic()
            .srem(keys::room_members(room_id), user_id)
            .srem(keys::room_admins(room_id), user_id)
            .srem(keys::user_rooms(user_id), room_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn add_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        if !self.is_member(room_id, user_id).await? {
            return Err(StoreError::NotMember {
                room_id,
                user_id: user_id.to_string(),
            });
        }
        let mut conn = self.client.get_connection();
        let added: i64 = conn.sadd(keys::room_admins(room_id), user_id).await?;
        Ok(added > 0)
    }

    async fn remove_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        let removed: i64 = conn.srem(keys::room_admins(room_id), user_id).await?;
        Ok(removed > 0)
    }

    async fn add_invite(&self, room_id: Uuid, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection();
        conn.sadd::<_, _, ()>(keys::room_invites(room_id), user_id)
            .await?;
        Ok(())
    }

    async fn take_invite(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        let removed: i64 = conn.srem(keys::room_invites(room_id), user_id).await?;
        Ok(removed > 0)
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection();
        let json = serde_json::to_string(message)?;
        let key = keys::room_messages(message.room_id);
        let keep_from = -(self.history_limit as isize);

        redis::pipe()
            .atomic()
            .rpush(&key, json)
            .ignore()
            .ltrim(&key, keep_from, -1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn messages(
        &self,
        room_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.client.get_connection();
        let raw: Vec<String> = conn.lrange(keys::room_messages(room_id), 0, -1).await?;
        Ok(window(Self::decode_messages(raw), since, limit))
    }

    async fn recent_messages(
        &self,
        room_id: Uuid,
        count: usize,
    ) -> Result<Vec<Message>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.client.get_connection();
        let raw: Vec<String> = conn
            .lrange(keys::room_messages(room_id), -(count as isize), -1)
            .await?;
        Ok(Self::decode_messages(raw))
    }

    async fn push_notification(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection();
        let json = serde_json::to_string(notification)?;
        conn.hset::<_, _, _, ()>(
            keys::user_notifications(user_id),
            notification.id.to_string(),
            json,
        )
        .await?;
        Ok(())
    }

    async fn notifications(&self, user_id: &str) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.client.get_connection();
        let raw: HashMap<String, String> = conn.hgetall(keys::user_notifications(user_id)).await?;

        let mut list = raw
            .into_values()
            .map(|json| serde_json::from_str::<Notification>(&json))
            .collect::<Result<Vec<_>, _>>()?;
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(list)
    }

    async fn mark_notification_read(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection();
        let key = keys::user_notifications(user_id);

        let raw: Option<String> = conn.hget(&key, id.to_string()).await?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut notification: Notification = serde_json::from_str(&raw)?;
        notification.read = true;
        conn.hset::<_, _, _, ()>(&key, id.to_string(), serde_json::to_string(&notification)?)
            .await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self.client.ping().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::Redis("Unexpected PING reply".to_string())),
            Err(e) => Err(StoreError::Redis(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateRoom;
    use crate::redis::RedisConfig;

    #[test]
    fn test_room_hash_round_trip() {
        let room = Room::new(CreateRoom {
            name: "ops".to_string(),
            is_public: false,
            created_by: "alice".to_string(),
        });

        let fields: HashMap<String, String> = RedisChatStore::room_fields(&room)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let parsed = RedisChatStore::parse_room(room.id, fields).unwrap().unwrap();
        assert_eq!(parsed.name, "ops");
        assert!(!parsed.is_public);
        assert_eq!(parsed.created_at.timestamp(), room.created_at.timestamp());
    }

    #[test]
    fn test_empty_hash_is_missing_room() {
        assert!(RedisChatStore::parse_room(Uuid::new_v4(), HashMap::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_partial_hash_is_corrupt() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "ops".to_string());
        let err = RedisChatStore::parse_room(Uuid::new_v4(), fields).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_room_lifecycle_against_redis() {
        let client = RedisClient::new(RedisConfig::new("redis://localhost:6379"))
            .await
            .unwrap();
        let store = RedisChatStore::new(client, 2);

        let room = Room::new(CreateRoom {
            name: "it".to_string(),
            is_public: true,
            created_by: "alice".to_string(),
        });
        store.create_room(&room).await.unwrap();
        assert!(store.is_admin(room.id, "alice").await.unwrap());

        store.add_member(room.id, "bob").await.unwrap();
        assert_eq!(store.members(room.id).await.unwrap(), vec!["alice", "bob"]);

        for text in ["one", "two", "three"] {
            store
                .append_message(&Message::new(room.id, "bob", "bob", text))
                .await
                .unwrap();
        }
        let history = store.messages(room.id, None, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "three");

        store.remove_member(room.id, "bob").await.unwrap();
        assert!(store.list_user_rooms("bob").await.unwrap().is_empty());
    }
}
