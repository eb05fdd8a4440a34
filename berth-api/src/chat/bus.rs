/// Event publication
///
/// [`LocalBus`] hands events straight to the hub. [`RedisBus`] publishes them
/// on the event's channel instead; [`spawn_relay`] runs the matching
/// `PSUBSCRIBE berth:events:*` loop that feeds every instance's hub.

use std::time::Duration;

use async_trait::async_trait;
use berth_shared::events::BusEvent;
use berth_shared::redis::{keys, RedisClient};
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::hub::ConnectionHub;

/// Delay before the relay reconnects after losing its subscription
const RELAY_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish event: {0}")]
    Publish(#[from] redis::RedisError),
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError>;
}

/// Single-process bus
pub struct LocalBus {
    hub: ConnectionHub,
}

impl LocalBus {
    pub fn new(hub: ConnectionHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError> {
        let reached = self.hub.deliver(&event);
        tracing::trace!(channel = %event.channel, reached, "Delivered event");
        Ok(())
    }
}

/// Bus shared by all instances through Redis pub/sub
pub struct RedisBus {
    client: RedisClient,
}

impl RedisBus {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, event: BusEvent) -> Result<(), BusError> {
        let payload = event.payload()?;
        let mut conn = self.client.get_connection();
        let receivers: i64 = conn.publish(&event.channel, payload).await?;
        tracing::trace!(channel = %event.channel, receivers, "Published event");
        Ok(())
    }
}

/// Starts the task relaying Redis pub/sub events into the local hub
///
/// The task reconnects on failure and exits when `shutdown` is cancelled.
pub fn spawn_relay(
    client: RedisClient,
    hub: ConnectionHub,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = relay_once(&client, &hub) => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Event relay lost its subscription, reconnecting");
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(RELAY_RETRY_DELAY) => {}
            }
        }
        tracing::info!("Event relay stopped");
    })
}

async fn relay_once(
    client: &RedisClient,
    hub: &ConnectionHub,
) -> Result<(), berth_shared::redis::RedisClientError> {
    let mut pubsub = client.pubsub().await?;
    pubsub.psubscribe(keys::EVENTS_PATTERN).await?;
    tracing::info!(pattern = keys::EVENTS_PATTERN, "Event relay subscribed");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Unreadable pub/sub payload");
                continue;
            }
        };

        match BusEvent::from_parts(channel, &payload) {
            Ok(event) => {
                hub.deliver(&event);
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed event"),
        }
    }

    Err(berth_shared::redis::RedisClientError::ConnectionError(
        "Pub/sub stream ended".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_shared::events::ServerEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_local_bus_delivers_to_hub() {
        let hub = ConnectionHub::new(4);
        let room_id = Uuid::new_v4();
        let mut rx = hub.subscribe_room(room_id);

        let bus = LocalBus::new(hub.clone());
        bus.publish(BusEvent::room(room_id, ServerEvent::Pong))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Pong);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_bus_round_trip() {
        use berth_shared::redis::RedisConfig;

        let client = RedisClient::new(RedisConfig::new("redis://localhost:6379"))
            .await
            .unwrap();
        let hub = ConnectionHub::new(4);
        let shutdown = CancellationToken::new();
        let relay = spawn_relay(client.clone(), hub.clone(), shutdown.clone());

        let room_id = Uuid::new_v4();
        let mut rx = hub.subscribe_room(room_id);
        tokio::time::sleep(Duration::from_millis(200)).await;

        RedisBus::new(client)
            .publish(BusEvent::room(room_id, ServerEvent::Pong))
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, ServerEvent::Pong);

        shutdown.cancel();
        relay.await.unwrap();
    }
}
