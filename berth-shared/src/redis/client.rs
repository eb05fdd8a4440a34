/// Redis client wrapper with reconnection and health checks
///
/// Commands go through a `redis::aio::ConnectionManager`, which reconnects on
/// its own. Pub/sub needs a dedicated connection, opened with
/// [`RedisClient::pubsub`].
///
/// # Example
///
/// ```no_run
/// use berth_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::new("redis://localhost:6379")).await?;
/// let stats = client.stats().await;
/// println!("{} healthy={}", stats.url, stats.healthy);
/// # Ok(())
/// # }
/// ```

use redis::aio::{ConnectionManager, PubSub};
use redis::{Client, RedisError};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Redis client errors
#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis health check failed: {0}")]
    HealthCheckFailed(String),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Format: redis://[username:password@]host:port[/db]
    pub url: String,

    /// Timeout for a single command, in seconds
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout_secs: 5,
        }
    }

    /// Loads the configuration from the environment
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: connection URL (required)
    /// - `REDIS_COMMAND_TIMEOUT_SECS`: command timeout (default: 5)
    ///
    /// # Errors
    ///
    /// Returns an error if `REDIS_URL` is not set.
    pub fn from_env() -> Result<Self, RedisClientError> {
        dotenvy::dotenv().ok();

        let url = env::var("REDIS_URL").map_err(|_| {
            RedisClientError::ConfigError("REDIS_URL environment variable is required".to_string())
        })?;

        let command_timeout_secs = env::var("REDIS_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            url,
            command_timeout_secs,
        })
    }
}

/// Shared Redis handle
///
/// Cheap to clone; all clones share one managed connection.
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!("Redis client connected to {}", sanitize_url(&config.url));

        Ok(Self {
            client,
            manager,
            config: Arc::new(config),
        })
    }

    /// Sends PING and reports whether PONG came back
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or times out.
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();

        let result: Result<String, RedisError> = tokio::time::timeout(
            self.command_timeout(),
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RedisClientError::HealthCheckFailed("PING command timed out".to_string()))?;

        match result {
            Ok(pong) if pong == "PONG" => Ok(true),
            Ok(other) => {
                tracing::warn!("Redis health check: unexpected response: {}", other);
                Ok(false)
            }
            Err(e) => Err(RedisClientError::HealthCheckFailed(e.to_string())),
        }
    }

    /// Returns a handle to the managed connection
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Opens a dedicated pub/sub connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn pubsub(&self) -> Result<PubSub, RedisClientError> {
        let conn = self.client.get_async_connection().await?;
        Ok(conn.into_pubsub())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub async fn stats(&self) -> RedisStats {
        RedisStats {
            healthy: self.ping().await.unwrap_or(false),
            url: sanitize_url(&self.config.url),
        }
    }
}

/// Connection summary for health output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStats {
    pub healthy: bool,

    /// URL with credentials masked
    pub url: String,
}

/// Masks credentials in a Redis URL for logging
pub fn sanitize_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at_pos)) if at_pos > scheme_end => {
            format!("{}***:***@{}", &url[..scheme_end + 3], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}
