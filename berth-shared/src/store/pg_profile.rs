/// PostgreSQL profile store
///
/// Schema lives in `migrations/` (see [`crate::models::profile`]).
///
/// # Example
///
/// ```no_run
/// use berth_shared::db::pool::{create_pool, DatabaseConfig};
/// use berth_shared::store::{PgProfileStore, ProfileStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
/// let store = PgProfileStore::new(pool);
/// let people = store.search("ada", 20).await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ProfileStore, StoreError};
use crate::db::pool::health_check;
use crate::models::{NewProfile, Profile, UpdateProfile};

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Escapes `LIKE` wildcards in user input
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn upsert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, username, email, display_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username
            RETURNING *
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn update(&self, id: &str, update: UpdateProfile) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                email = COALESCE($2, email),
                display_name = COALESCE($3, display_name),
                bio = COALESCE($4, bio),
                picture = COALESCE($5, picture),
                street = COALESCE($6, street),
                city = COALESCE($7, city),
                state = COALESCE($8, state),
                zip_code = COALESCE($9, zip_code),
                country = COALESCE($10, country),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.email)
        .bind(update.display_name)
        .bind(update.bio)
        .bind(update.picture)
        .bind(update.street)
        .bind(update.city)
        .bind(update.state)
        .bind(update.zip_code)
        .bind(update.country)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Profile {}", id)))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Profile>, StoreError> {
        let profiles = sqlx::query_as::<_, Profile>(
            r#"
            SELECT * FROM profiles
            WHERE username ILIKE $1 OR display_name ILIKE $1
            ORDER BY username
            LIMIT $2
            "#,
        )
        .bind(like_pattern(query))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        health_check(&self.pool).await?;
        Ok(())
    }
}
