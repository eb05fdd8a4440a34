/// User profile model
///
/// Profiles are keyed by the identity provider's subject (`sub` claim) and
/// carry a unique username taken from `preferred_username`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE profiles (
///     id TEXT PRIMARY KEY,
///     username TEXT NOT NULL UNIQUE,
///     email TEXT,
///     display_name TEXT,
///     bio TEXT,
///     picture TEXT,
///     street TEXT,
///     city TEXT,
///     state TEXT,
///     zip_code TEXT,
///     country TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's public profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    /// Identity provider subject
    pub id: String,

    /// Unique username (`preferred_username` claim)
    pub username: String,

    pub email: Option<String>,

    /// Name shown next to messages; falls back to the username in clients
    pub display_name: Option<String>,

    pub bio: Option<String>,

    /// Picture URL
    pub picture: Option<String>,

    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a profile from token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Input for updating a profile
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub picture: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

impl UpdateProfile {
    /// Whether the update would change nothing
    pub fn is_empty(&self) -> bool {
        *self == UpdateProfile::default()
    }

    /// Applies the update to an in-memory profile
    pub fn apply_to(self, profile: &mut Profile) {
        fn set(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }

        set(&mut profile.email, self.email);
        set(&mut profile.display_name, self.display_name);
        set(&mut profile.bio, self.bio);
        set(&mut profile.picture, self.picture);
        set(&mut profile.street, self.street);
        set(&mut profile.city, self.city);
        set(&mut profile.state, self.state);
        set(&mut profile.zip_code, self.zip_code);
        set(&mut profile.country, self.country);
        profile.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        let now = Utc::now();
        Profile {
            id: "sub-1".to_string(),
            username: "ada".to_string(),
            email: None,
            display_name: None,
            bio: Some("old bio".to_string()),
            picture: None,
            street: None,
            city: None,
            state: None,
            zip_code: None,
            country: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_update_only_touches_present_fields() {
        let mut p = profile();
        let update = UpdateProfile {
            city: Some("London".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());

        update.apply_to(&mut p);
        assert_eq!(p.city.as_deref(), Some("London"));
        assert_eq!(p.bio.as_deref(), Some("old bio"));
    }

    #[test]
    fn test_empty_update() {
        assert!(UpdateProfile::default().is_empty());
    }
}
