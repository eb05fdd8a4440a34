//! In-process stores
//!
//! Used when no database or Redis URL is configured, and by the API's
//! integration tests. State lives behind a `tokio::sync::RwLock` and is lost
//! on restart.

use std::collections::{BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{window, ChatStore, ProfileStore, StoreError, DEFAULT_HISTORY_LIMIT};
use crate::models::{Message, NewProfile, Notification, Profile, Room, UpdateProfile};

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn upsert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        let mut profiles = self.profiles.write().await;

        let taken = profiles
            .values()
            .any(|p| p.username == profile.username && p.id != profile.id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "Username {} is taken",
                profile.username
            )));
        }

        let now = Utc::now();
        let entry = profiles.entry(profile.id.clone()).or_insert_with(|| Profile {
            id: profile.id.clone(),
            username: profile.username.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            bio: None,
            picture: None,
            street: None,
            city: None,
            state: None,
            zip_code: None,
            country: None,
            created_at: now,
            updated_at: now,
        });
        entry.username = profile.username;

        Ok(entry.clone())
    }

    async fn update(&self, id: &str, update: UpdateProfile) -> Result<Profile, StoreError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id)))?;
        update.apply_to(profile);
        Ok(profile.clone())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Profile>, StoreError> {
        let needle = query.to_lowercase();
        let profiles = self.profiles.read().await;

        let mut found: Vec<Profile> = profiles
            .values()
            .filter(|p| {
                p.username.to_lowercase().contains(&needle)
                    || p.display_name
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found.truncate(limit);
        Ok(found)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct ChatState {
    rooms: HashMap<Uuid, Room>,
    members: HashMap<Uuid, BTreeSet<String>>,
    admins: HashMap<Uuid, BTreeSet<String>>,
    invites: HashMap<Uuid, BTreeSet<String>>,
    messages: HashMap<Uuid, VecDeque<Message>>,
    user_rooms: HashMap<String, BTreeSet<Uuid>>,
    notifications: HashMap<String, HashMap<Uuid, Notification>>,
}

impl ChatState {
    fn rooms_sorted<'a>(&self, ids: impl Iterator<Item = &'a Uuid>) -> Vec<Room> {
        let mut rooms: Vec<Room> = ids.filter_map(|id| self.rooms.get(id).cloned()).collect();
        rooms.sort_by_key(|r| r.created_at);
        rooms
    }

    fn set_contains(map: &HashMap<Uuid, BTreeSet<String>>, room_id: Uuid, user_id: &str) -> bool {
        map.get(&room_id).is_some_and(|set| set.contains(user_id))
    }
}

pub struct MemoryChatStore {
    state: RwLock<ChatState>,
    history_limit: usize,
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryChatStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: RwLock::new(ChatState::default()),
            history_limit: history_limit.max(1),
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.rooms.contains_key(&room.id) {
            return Err(StoreError::Conflict(format!("Room {} exists", room.id)));
        }

        state.rooms.insert(room.id, room.clone());
        state
            .members
            .entry(room.id)
            .or_default()
            .insert(room.created_by.clone());
        state
            .admins
            .entry(room.id)
            .or_default()
            .insert(room.created_by.clone());
        state
            .user_rooms
            .entry(room.created_by.clone())
            .or_default()
            .insert(room.id);
        Ok(())
    }

    async fn get_room(&self, id: Uuid) -> Result<Option<Room>, StoreError> {
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }

    async fn update_room(&self, room: &Room) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.rooms.get_mut(&room.id) {
            Some(existing) => {
                existing.name = room.name.clone();
                existing.is_public = room.is_public;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Room {}", room.id))),
        }
    }

    async fn list_public_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let state = self.state.read().await;
        let ids: Vec<Uuid> = state
            .rooms
            .values()
            .filter(|r| r.is_public)
            .map(|r| r.id)
            .collect();
        Ok(state.rooms_sorted(ids.iter()))
    }

    async fn list_user_rooms(&self, user_id: &str) -> Result<Vec<Room>, StoreError> {
        let state = self.state.read().await;
        Ok(match state.user_rooms.get(user_id) {
            Some(ids) => state.rooms_sorted(ids.iter()),
            None => Vec::new(),
        })
    }

    async fn members(&self, room_id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .get(&room_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn admins(&self, room_id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .admins
            .get(&room_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn is_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(ChatState::set_contains(&state.members, room_id, user_id))
    }

    async fn is_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(ChatState::set_contains(&state.admins, room_id, user_id))
    }

    async fn add_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let added = state
            .members
            .entry(room_id)
            .or_default()
            .insert(user_id.to_string());
        state
            .user_rooms
            .entry(user_id.to_string())
            .or_default()
            .insert(room_id);
        Ok(added)
    }

    async fn remove_member(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let removed = state
            .members
            .get_mut(&room_id)
            .is_some_and(|s| s.remove(user_id));
        if let Some(admins) = state.admins.get_mut(&room_id) {
            admins.remove(user_id);
        }
        if let Some(rooms) = state.user_rooms.get_mut(user_id) {
            rooms.remove(&room_id);
        }
        Ok(removed)
    }

    async fn add_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if !ChatState::set_contains(&state.members, room_id, user_id) {
            return Err(StoreError::NotMember {
                room_id,
                user_id: user_id.to_string(),
            });
        }
        Ok(state
            .admins
            .entry(room_id)
            .or_default()
            .insert(user_id.to_string()))
    }

    async fn remove_admin(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .admins
            .get_mut(&room_id)
            .is_some_and(|s| s.remove(user_id)))
    }

    async fn add_invite(&self, room_id: Uuid, user_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .invites
            .entry(room_id)
            .or_default()
            .insert(user_id.to_string());
        Ok(())
    }

    async fn take_invite(&self, room_id: Uuid, user_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .invites
            .get_mut(&room_id)
            .is_some_and(|s| s.remove(user_id)))
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let history = state.messages.entry(message.room_id).or_default();
        history.push_back(message.clone());
        while history.len() > self.history_limit {
            history.pop_front();
        }
        Ok(())
    }

    async fn messages(
        &self,
        room_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let history = state
            .messages
            .get(&room_id)
            .map(|h| h.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(window(history, since, limit))
    }

    async fn recent_messages(
        &self,
        room_id: Uuid,
        count: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.messages(room_id, None, Some(count)).await
    }

    async fn push_notification(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .notifications
            .entry(user_id.to_string())
            .or_default()
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn notifications(&self, user_id: &str) -> Result<Vec<Notification>, StoreError> {
        let state = self.state.read().await;
        let mut list: Vec<Notification> = state
            .notifications
            .get(user_id)
            .map(|n| n.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(list)
    }

    async fn mark_notification_read(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state
            .notifications
            .get_mut(user_id)
            .and_then(|n| n.get_mut(&id))
        {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateRoom, NotificationKind};

    fn room(creator: &str, is_public: bool) -> Room {
        Room::new(CreateRoom {
            name: "general".to_string(),
            is_public,
            created_by: creator.to_string(),
        })
    }

    fn new_profile(id: &str, username: &str) -> NewProfile {
        NewProfile {
            id: id.to_string(),
            username: username.to_string(),
            email: None,
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_creator_is_member_and_admin() {
        let store = MemoryChatStore::default();
        let r = room("alice", true);
        store.create_room(&r).await.unwrap();

        assert!(store.is_member(r.id, "alice").await.unwrap());
        assert!(store.is_admin(r.id, "alice").await.unwrap());
        assert_eq!(store.list_user_rooms("alice").await.unwrap(), vec![r.clone()]);
        assert_eq!(store.list_public_rooms().await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn test_private_rooms_not_listed() {
        let store = MemoryChatStore::default();
        store.create_room(&room("alice", false)).await.unwrap();
        assert!(store.list_public_rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_member_drops_admin_and_user_room() {
        let store = MemoryChatStore::default();
        let r = room("alice", true);
        store.create_room(&r).await.unwrap();
        store.add_member(r.id, "bob").await.unwrap();
        store.add_admin(r.id, "bob").await.unwrap();

        assert!(store.remove_member(r.id, "bob").await.unwrap());
        assert!(!store.is_admin(r.id, "bob").await.unwrap());
        assert!(store.list_user_rooms("bob").await.unwrap().is_empty());
        assert!(!store.remove_member(r.id, "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_requires_membership() {
        let store = MemoryChatStore::default();
        let r = room("alice", true);
        store.create_room(&r).await.unwrap();

        let err = store.add_admin(r.id, "mallory").await.unwrap_err();
        assert!(matches!(err, StoreError::NotMember { .. }));
    }

    #[tokio::test]
    async fn test_invite_is_consumed_once() {
        let store = MemoryChatStore::default();
        let r = room("alice", false);
        store.create_room(&r).await.unwrap();
        store.add_invite(r.id, "bob").await.unwrap();

        assert!(store.take_invite(r.id, "bob").await.unwrap());
        assert!(!store.take_invite(r.id, "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_history_is_trimmed_oldest_first() {
        let store = MemoryChatStore::new(3);
        let room_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append_message(&Message::new(room_id, "alice", "alice", format!("m{i}")))
                .await
                .unwrap();
        }

        let texts: Vec<String> = store
            .messages(room_id, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);

        let recent = store.recent_messages(room_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].text, "m4");
    }

    #[tokio::test]
    async fn test_notifications_newest_first_and_mark_read() {
        let store = MemoryChatStore::default();
        let room_id = Uuid::new_v4();
        let mut older = Notification::new(NotificationKind::RoomInvite, room_id, "a", "alice");
        older.timestamp -= chrono::Duration::minutes(5);
        let newer = Notification::new(NotificationKind::AdminGranted, room_id, "a", "alice");

        store.push_notification("bob", &older).await.unwrap();
        store.push_notification("bob", &newer).await.unwrap();

        let list = store.notifications("bob").await.unwrap();
        assert_eq!(list[0].id, newer.id);
        assert_eq!(list[1].id, older.id);

        assert!(store.mark_notification_read("bob", older.id).await.unwrap());
        assert!(!store.mark_notification_read("bob", Uuid::new_v4()).await.unwrap());
        let list = store.notifications("bob").await.unwrap();
        assert!(list.iter().find(|n| n.id == older.id).unwrap().read);
    }

    #[tokio::test]
    async fn test_profile_upsert_keeps_edits() {
        let store = MemoryProfileStore::new();
        store.upsert(new_profile("sub-1", "ada")).await.unwrap();
        store
            .update(
                "sub-1",
                UpdateProfile {
                    bio: Some("mathematician".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let again = store.upsert(new_profile("sub-1", "ada_l")).await.unwrap();
        assert_eq!(again.username, "ada_l");
        assert_eq!(again.bio.as_deref(), Some("mathematician"));
    }

    #[tokio::test]
    async fn test_profile_username_conflict() {
        let store = MemoryProfileStore::new();
        store.upsert(new_profile("sub-1", "ada")).await.unwrap();
        let err = store.upsert(new_profile("sub-2", "ada")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_profile_search() {
        let store = MemoryProfileStore::new();
        store.upsert(new_profile("sub-1", "ada")).await.unwrap();
        store.upsert(new_profile("sub-2", "grace")).await.unwrap();
        store
            .update(
                "sub-2",
                UpdateProfile {
                    display_name: Some("Grace Hopper".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = store.search("HOP", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "sub-2");
        assert_eq!(store.search("a", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_profile() {
        let store = MemoryProfileStore::new();
        let err = store
            .update("nobody", UpdateProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
