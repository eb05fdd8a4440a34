/// Embedded schema migrations
///
/// Migration files live in the workspace `migrations/` directory and are
/// compiled into the binary with `sqlx::migrate!`.

use sqlx::postgres::PgPool;
use tracing::{info, warn};

/// Applies all pending migrations
///
/// # Errors
///
/// Returns an error if a migration fails to apply; the failed migration is
/// rolled back.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations");

    match sqlx::migrate!("../migrations").run(pool).await {
        Ok(()) => {
            info!("Database schema is up to date");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}
