//! # berth
//!
//! Command line for the self-hosted service stack.
//!
//! ## Usage
//!
//! ```bash
//! berth -c stack.toml plan
//! berth up --only keycloak,users
//! berth stop nextcloud --dbs
//! ```

use berth_deploy::cli::{commands, Cli};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(format!("berth_deploy={}", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "berth_deploy=info".into()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::debug!("berth v{} starting...", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    commands::execute(cli, cancel).await
}
