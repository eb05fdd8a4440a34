/// Health check endpoint
///
/// Reports whether the profile and chat stores are reachable.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "chat_store": "connected"
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    pub version: String,

    /// Profile store status
    pub database: String,

    pub chat_store: String,
}

fn status(connected: bool) -> String {
    if connected { "connected" } else { "disconnected" }.to_string()
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let (profiles, chat) = tokio::join!(state.profiles.ping(), state.chat.ping());

    if let Err(e) = &profiles {
        tracing::warn!(error = %e, "Profile store health check failed");
    }
    if let Err(e) = &chat {
        tracing::warn!(error = %e, "Chat store health check failed");
    }

    let healthy = profiles.is_ok() && chat.is_ok();
    Ok(Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status(profiles.is_ok()),
        chat_store: status(chat.is_ok()),
    }))
}
