/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use berth_api::{app::{build_router, AppState}, config::Config};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let (state, _relay) = AppState::connect(config, CancellationToken::new()).await?;
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{
    chat::{spawn_relay, ConnectionHub, EventBus, LocalBus, RedisBus},
    config::{AuthConfig, AuthMode, Config},
    error::ApiError,
    translate::Translator,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use berth_shared::{
    auth::{bearer_token, AuthContext, TokenVerifier},
    db::{migrations::run_migrations, pool},
    redis::{RedisClient, RedisConfig},
    store::{
        ChatStore, MemoryChatStore, MemoryProfileStore, PgProfileStore, ProfileStore,
        RedisChatStore,
    },
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned into every handler; all fields are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<dyn ProfileStore>,

    pub chat: Arc<dyn ChatStore>,

    pub verifier: Arc<TokenVerifier>,

    /// Local websocket subscribers
    pub hub: ConnectionHub,

    pub bus: Arc<dyn EventBus>,

    /// `None` when no translation service is configured
    pub translator: Option<Arc<Translator>>,

    pub config: Arc<Config>,
}

impl AppState {
    /// State backed entirely by in-process stores
    pub fn in_memory(config: Config) -> Self {
        let hub = ConnectionHub::new(config.chat.broadcast_capacity);
        Self {
            profiles: Arc::new(MemoryProfileStore::new()),
            chat: Arc::new(MemoryChatStore::new(config.chat.history_limit)),
            verifier: Arc::new(verifier_for(&config.auth)),
            bus: Arc::new(LocalBus::new(hub.clone())),
            hub,
            translator: translator_for(&config),
            config: Arc::new(config),
        }
    }

    /// Connects the configured backends
    ///
    /// Postgres is migrated on startup. With Redis configured, chat state is
    /// stored there and a relay task is started; its handle is returned so the
    /// caller can await it after cancelling `shutdown`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured backend cannot be reached.
    pub async fn connect(
        config: Config,
        shutdown: CancellationToken,
    ) -> anyhow::Result<(Self, Option<JoinHandle<()>>)> {
        let hub = ConnectionHub::new(config.chat.broadcast_capacity);

        let profiles: Arc<dyn ProfileStore> = match &config.database {
            Some(db) => {
                let pool = pool::create_pool(pool::DatabaseConfig {
                    url: db.url.clone(),
                    max_connections: db.max_connections,
                    ..Default::default()
                })
                .await?;
                run_migrations(&pool).await?;
                Arc::new(PgProfileStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, profiles are kept in memory");
                Arc::new(MemoryProfileStore::new())
            }
        };

        let (chat, bus, relay): (Arc<dyn ChatStore>, Arc<dyn EventBus>, _) = match &config.redis
        {
            Some(redis) => {
                let client = RedisClient::new(RedisConfig::new(redis.url.clone())).await?;
                let relay = spawn_relay(client.clone(), hub.clone(), shutdown);
                (
                    Arc::new(RedisChatStore::new(client.clone(), config.chat.history_limit)),
                    Arc::new(RedisBus::new(client)),
                    Some(relay),
                )
            }
            None => {
                tracing::warn!("REDIS_URL not set, chat state is kept in memory");
                (
                    Arc::new(MemoryChatStore::new(config.chat.history_limit)),
                    Arc::new(LocalBus::new(hub.clone())),
                    None,
                )
            }
        };

        let state = Self {
            profiles,
            chat,
            verifier: Arc::new(verifier_for(&config.auth)),
            hub,
            bus,
            translator: translator_for(&config),
            config: Arc::new(config),
        };
        Ok((state, relay))
    }
}

/// Builds the token verifier for the configured auth mode
pub fn verifier_for(auth: &AuthConfig) -> TokenVerifier {
    match &auth.mode {
        AuthMode::Jwks { keycloak_url } => {
            TokenVerifier::jwks(keycloak_url, auth.issuer(), &auth.realm, &auth.audience)
        }
        AuthMode::SharedSecret { secret } => {
            tracing::warn!("Verifying tokens with a shared secret; use only for development");
            TokenVerifier::shared_secret(secret, auth.issuer(), &auth.audience)
        }
    }
}

fn translator_for(config: &Config) -> Option<Arc<Translator>> {
    config
        .translate
        .url
        .as_ref()
        .map(|url| Arc::new(Translator::new(url)))
}

/// Builds the router
///
/// ```text
/// /health                              public
/// /ws, /ws/rooms/:id                   token sent in the first frame
/// /profile, /profile/:user_id          bearer token
/// /users/:username, /people
/// /rooms, /user/rooms, /rooms/:id/...
/// /notifications, /notifications/:id/read
/// /languages
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws", get(routes::ws::user_socket))
        .route("/ws/rooms/:id", get(routes::ws::room_socket));

    let protected_routes = Router::new()
        .route(
            "/profile",
            get(routes::profile::get_own_profile).put(routes::profile::update_own_profile),
        )
        .route("/profile/:user_id", get(routes::profile::get_profile))
        .route("/users/:username", get(routes::profile::get_by_username))
        .route("/people", get(routes::profile::search_people))
        .route(
            "/rooms",
            post(routes::rooms::create_room).get(routes::rooms::list_public_rooms),
        )
        .route("/user/rooms", get(routes::rooms::list_user_rooms))
        .route(
            "/rooms/:id",
            get(routes::rooms::get_room).put(routes::rooms::update_room),
        )
        .route("/rooms/:id/join", post(routes::rooms::join_room))
        .route("/rooms/:id/leave", post(routes::rooms::leave_room))
        .route("/rooms/:id/members", get(routes::rooms::list_members))
        .route(
            "/rooms/:id/members/:user_id",
            delete(routes::rooms::remove_member),
        )
        .route("/rooms/:id/invite", post(routes::rooms::invite))
        .route(
            "/rooms/:id/admins/:user_id",
            post(routes::rooms::grant_admin).delete(routes::rooms::revoke_admin),
        )
        .route("/rooms/:id/messages", get(routes::messages::list_messages))
        .route("/rooms/:id/message", post(routes::messages::post_message))
        .route(
            "/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/notifications/:id/read",
            post(routes::notifications::mark_read),
        )
        .route("/languages", get(routes::languages::list_languages))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Verifies the bearer token and stores the caller's [`AuthContext`]
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = bearer_token(auth_header)?;
    let claims = state.verifier.verify(token).await?;

    req.extensions_mut().insert(AuthContext::from_claims(claims));

    Ok(next.run(req).await)
}
