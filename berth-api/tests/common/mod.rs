/// Common test utilities for integration tests
///
/// The router runs over the in-memory stores with HS256 tokens, so these
/// tests need no Postgres, Redis or identity provider.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use berth_api::app::{build_router, AppState};
use berth_api::config::Config;
use berth_shared::auth::jwt::create_token;
use berth_shared::auth::Claims;
use serde_json::Value;
use tower::ServiceExt as _;

pub const TEST_SECRET: &str = "test-secret-key-at-least-32-characters-long";

/// Test context holding the app and its state
pub struct TestContext {
    pub app: axum::Router,
    pub state: AppState,
    pub config: Config,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::in_memory(TEST_SECRET))
    }

    pub fn with_config(config: Config) -> Self {
        let state = AppState::in_memory(config.clone());
        let app = build_router(state.clone());
        Self { app, state, config }
    }

    /// Token for `sub` with `preferred_username` set to `username`
    pub fn token(&self, sub: &str, username: &str) -> String {
        let claims = Claims::new(sub, username, self.config.auth.issuer(), "account");
        create_token(&claims, TEST_SECRET).unwrap()
    }

    /// Sends a request as `sub` and returns status plus JSON body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        sub: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(sub) = sub {
            builder = builder.header("authorization", format!("Bearer {}", self.token(sub, sub)));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, sub: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(sub), None).await
    }

    pub async fn post(&self, uri: &str, sub: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(sub), Some(body)).await
    }

    /// Creates a room owned by `sub` and returns its ID
    pub async fn create_room(&self, sub: &str, name: &str, is_public: bool) -> String {
        let (status, body) = self
            .post(
                "/rooms",
                sub,
                serde_json::json!({ "name": name, "isPublic": is_public }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["room_id"].as_str().unwrap().to_string()
    }
}

/// Helper to wait for condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout_secs: u64) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);

    loop {
        if condition().await {
            return Ok(());
        }

        if start.elapsed() > timeout {
            anyhow::bail!("Condition not met within {} seconds", timeout_secs);
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
    }
}
