//! # berth API Server
//!
//! User profiles, chat rooms and websocket fan-out.
//!
//! ## Usage
//!
//! ```bash
//! AUTH_JWT_SECRET=... cargo run -p berth-api
//! ```

use berth_api::{
    app::{build_router, AppState},
    config::Config,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("berth API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    let shutdown = CancellationToken::new();
    let (state, relay) = AppState::connect(config, shutdown.clone()).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received, exiting...");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(relay) = relay {
        relay.await.ok();
    }

    Ok(())
}
