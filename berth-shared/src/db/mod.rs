/// PostgreSQL access for profiles
///
/// # Modules
///
/// - `pool`: connection pool with health checks
/// - `migrations`: embedded schema migrations from the workspace `migrations/` directory
///
/// # Example
///
/// ```no_run
/// use berth_shared::db::pool::{create_pool, DatabaseConfig};
/// use berth_shared::db::migrations::run_migrations;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
/// run_migrations(&pool).await?;
/// # Ok(())
/// # }
/// ```

pub mod migrations;
pub mod pool;
