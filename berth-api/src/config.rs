/// Configuration for the chat API
///
/// Everything comes from environment variables; a `.env` file is loaded
/// first when present.
///
/// # Environment Variables
///
/// | Variable | Default | |
/// |---|---|---|
/// | `API_HOST` | `0.0.0.0` | |
/// | `API_PORT` | `8000` | |
/// | `CORS_ORIGINS` | `*` | comma separated |
/// | `DATABASE_URL` | unset | profiles kept in memory when unset |
/// | `DATABASE_MAX_CONNECTIONS` | `10` | |
/// | `REDIS_URL` | unset | chat state and fan-out kept in process when unset |
/// | `KEYCLOAK_URL` | unset | where the API reaches the identity provider |
/// | `KEYCLOAK_ISSUER_URL` | `KEYCLOAK_URL` | public base URL found in `iss` |
/// | `KEYCLOAK_REALM` | `master` | |
/// | `AUTH_JWT_SECRET` | unset | HS256 secret, replaces JWKS verification |
/// | `AUTH_AUDIENCE` | `account` | |
/// | `LIBRETRANSLATE_URL` | unset | translation disabled when unset |
/// | `CHAT_HISTORY_LIMIT` | `1000` | messages kept per room |
/// | `CHAT_INITIAL_MESSAGES` | `20` | history sent to a new room socket |
/// | `CHAT_BROADCAST_CAPACITY` | `256` | per-channel buffer |
/// | `WS_AUTH_TIMEOUT_SECS` | `10` | deadline for the first socket frame |
///
/// # Example
///
/// ```no_run
/// use berth_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("listening on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    /// `None` selects the in-memory profile store
    pub database: Option<DatabaseConfig>,

    /// `None` selects the in-memory chat store and in-process fan-out
    pub redis: Option<RedisSettings>,

    pub auth: AuthConfig,

    pub translate: TranslateConfig,

    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed origins; `*` allows any
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

/// How bearer tokens are verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthMode {
    /// RS256 with keys from `{keycloak_url}/realms/{realm}/protocol/openid-connect/certs`
    Jwks { keycloak_url: String },

    /// HS256 with a shared secret
    SharedSecret { secret: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Base URL tokens name in `iss`, without `/realms/...`
    pub issuer_base: String,

    pub realm: String,

    pub audience: String,
}

impl AuthConfig {
    /// Full expected `iss` value
    pub fn issuer(&self) -> String {
        berth_shared::auth::issuer_for(&self.issuer_base, &self.realm)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslateConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub history_limit: usize,
    pub initial_messages: usize,
    pub broadcast_capacity: usize,
    pub ws_auth_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 1000,
            initial_messages: 20,
            broadcast_capacity: 256,
            ws_auth_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a numeric variable does not parse
    /// - neither `AUTH_JWT_SECRET` nor `KEYCLOAK_URL` is set
    /// - `AUTH_JWT_SECRET` is shorter than 32 characters
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api = ApiConfig {
            host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(var("API_PORT"), "API_PORT", 8000)?,
            cors_origins: var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["*".to_string()]),
        };

        let database = match var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(
                    var("DATABASE_MAX_CONNECTIONS"),
                    "DATABASE_MAX_CONNECTIONS",
                    10,
                )?,
            }),
            None => None,
        };

        let redis = var("REDIS_URL").map(|url| RedisSettings { url });

        let keycloak_url = var("KEYCLOAK_URL");
        let mode = match (var("AUTH_JWT_SECRET"), keycloak_url.clone()) {
            (Some(secret), _) => {
                if secret.len() < 32 {
                    anyhow::bail!("AUTH_JWT_SECRET must be at least 32 characters long");
                }
                AuthMode::SharedSecret { secret }
            }
            (None, Some(keycloak_url)) => AuthMode::Jwks { keycloak_url },
            (None, None) => {
                anyhow::bail!("Either KEYCLOAK_URL or AUTH_JWT_SECRET environment variable is required")
            }
        };

        let auth = AuthConfig {
            mode,
            issuer_base: var("KEYCLOAK_ISSUER_URL")
                .or(keycloak_url)
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            realm: var("KEYCLOAK_REALM").unwrap_or_else(|| "master".to_string()),
            audience: var("AUTH_AUDIENCE").unwrap_or_else(|| "account".to_string()),
        };

        let defaults = ChatConfig::default();
        let chat = ChatConfig {
            history_limit: parse_or(
                var("CHAT_HISTORY_LIMIT"),
                "CHAT_HISTORY_LIMIT",
                defaults.history_limit,
            )?,
            initial_messages: parse_or(
                var("CHAT_INITIAL_MESSAGES"),
                "CHAT_INITIAL_MESSAGES",
                defaults.initial_messages,
            )?,
            broadcast_capacity: parse_or(
                var("CHAT_BROADCAST_CAPACITY"),
                "CHAT_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            )?,
            ws_auth_timeout_secs: parse_or(
                var("WS_AUTH_TIMEOUT_SECS"),
                "WS_AUTH_TIMEOUT_SECS",
                defaults.ws_auth_timeout_secs,
            )?,
        };

        if chat.broadcast_capacity == 0 {
            anyhow::bail!("CHAT_BROADCAST_CAPACITY must be greater than zero");
        }

        Ok(Self {
            api,
            database,
            redis,
            auth,
            translate: TranslateConfig {
                url: var("LIBRETRANSLATE_URL"),
            },
            chat,
        })
    }

    /// In-memory configuration with HS256 tokens, for local runs and tests
    pub fn in_memory(secret: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_origins: vec!["*".to_string()],
            },
            database: None,
            redis: None,
            auth: AuthConfig {
                mode: AuthMode::SharedSecret {
                    secret: secret.into(),
                },
                issuer_base: "http://localhost:8080".to_string(),
                realm: "berth".to_string(),
                audience: "account".to_string(),
            },
            translate: TranslateConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
