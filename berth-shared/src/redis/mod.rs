/// Redis integration for chat rooms, history and fan-out
///
/// Rooms, their relation sets, message history and notifications are stored
/// under the `berth:` prefix. Live events travel over pub/sub channels so
/// that several API instances can serve the same room.
///
/// # Layout
///
/// ```text
/// berth:room:{id}                 hash   name, is_public, created_by, created_at
/// berth:room:{id}:members         set    subjects
/// berth:room:{id}:admins          set    subjects (subset of members)
/// berth:room:{id}:invites         set    subjects with a pending invite
/// berth:room:{id}:messages        list   message JSON, oldest first
/// berth:rooms:public              set    public room IDs
/// berth:user:{sub}:rooms          set    room IDs the user belongs to
/// berth:user:{sub}:notifications  hash   notification ID -> JSON
///
/// berth:events:room:{id}          pub/sub room events
/// berth:events:user:{sub}         pub/sub user events
/// ```
///
/// # Example
///
/// ```no_run
/// use berth_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisConfig::from_env()?;
/// let client = RedisClient::new(config).await?;
/// assert!(client.ping().await?);
/// # Ok(())
/// # }
/// ```

pub mod client;
pub mod keys;

pub use client::{RedisClient, RedisClientError, RedisConfig, RedisStats};
