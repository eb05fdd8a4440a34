use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use berth_shared::events::{BusEvent, ServerEvent};
use berth_shared::redis::keys::ChannelTarget;
use tokio::sync::broadcast;
use uuid::Uuid;

/// In-process registry of broadcast channels
///
/// A channel exists while it has receivers. Senders are created by the first
/// subscriber and removed once delivery finds nobody listening or a socket
/// releases the last receiver.
#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    channels: Mutex<HashMap<ChannelTarget, broadcast::Sender<ServerEvent>>>,
    capacity: usize,
}

impl ConnectionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn subscribe_room(&self, room_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.subscribe(ChannelTarget::Room(room_id))
    }

    pub fn subscribe_user(&self, user_id: &str) -> broadcast::Receiver<ServerEvent> {
        self.subscribe(ChannelTarget::User(user_id.to_string()))
    }

    fn subscribe(&self, target: ChannelTarget) -> broadcast::Receiver<ServerEvent> {
        let mut channels = self.lock();
        channels
            .entry(target)
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    /// Sends an event to every local subscriber of its channel
    ///
    /// Returns the number of receivers reached.
    pub fn deliver(&self, event: &BusEvent) -> usize {
        let Some(target) = event.target() else {
            tracing::warn!(channel = %event.channel, "Dropping event for unknown channel");
            return 0;
        };

        let mut channels = self.lock();
        let Some(sender) = channels.get(&target) else {
            return 0;
        };

        match sender.send(event.event.clone()) {
            Ok(count) => count,
            Err(_) => {
                channels.remove(&target);
                0
            }
        }
    }

    /// Drops the channel if its last receiver is gone
    pub fn release(&self, target: &ChannelTarget) {
        let mut channels = self.lock();
        if channels
            .get(target)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(target);
        }
    }

    pub fn subscriber_count(&self, target: &ChannelTarget) -> usize {
        self.lock()
            .get(target)
            .map_or(0, |sender| sender.receiver_count())
    }

    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelTarget, broadcast::Sender<ServerEvent>>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_room_subscribers_receive() {
        let hub = ConnectionHub::new(8);
        let room_id = Uuid::new_v4();
        let mut a = hub.subscribe_room(room_id);
        let mut b = hub.subscribe_room(room_id);

        let reached = hub.deliver(&BusEvent::room(room_id, ServerEvent::Pong));
        assert_eq!(reached, 2);
        assert_eq!(a.recv().await.unwrap(), ServerEvent::Pong);
        assert_eq!(b.recv().await.unwrap(), ServerEvent::Pong);
    }

    #[tokio::test]
    async fn test_user_and_room_channels_are_separate() {
        let hub = ConnectionHub::new(8);
        let room_id = Uuid::new_v4();
        let mut user = hub.subscribe_user("bob");
        let _room = hub.subscribe_room(room_id);

        hub.deliver(&BusEvent::room(room_id, ServerEvent::Pong));
        assert!(user.try_recv().is_err());

        hub.deliver(&BusEvent::user("bob", ServerEvent::error("x")));
        assert_eq!(user.recv().await.unwrap(), ServerEvent::error("x"));
    }

    #[test]
    fn test_channel_removed_without_receivers() {
        let hub = ConnectionHub::new(8);
        let room_id = Uuid::new_v4();
        let rx = hub.subscribe_room(room_id);
        assert_eq!(hub.channel_count(), 1);

        drop(rx);
        assert_eq!(hub.deliver(&BusEvent::room(room_id, ServerEvent::Pong)), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn test_release_keeps_channel_with_listeners() {
        let hub = ConnectionHub::new(8);
        let target = ChannelTarget::User("bob".to_string());
        let first = hub.subscribe_user("bob");
        let _second = hub.subscribe_user("bob");

        drop(first);
        hub.release(&target);
        assert_eq!(hub.subscriber_count(&target), 1);
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let hub = ConnectionHub::new(2);
        let room_id = Uuid::new_v4();
        let mut rx = hub.subscribe_room(room_id);

        for _ in 0..4 {
            hub.deliver(&BusEvent::room(room_id, ServerEvent::Pong));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
    }
}
