/// Profile endpoints
///
/// Profiles are keyed by the identity provider subject. The caller's own
/// profile is created from the token claims the first time it is requested.
///
/// # Endpoints
///
/// - `GET /profile` - Own profile
/// - `PUT /profile` - Update own profile
/// - `GET /profile/:user_id` - Profile by subject
/// - `GET /users/:username` - Profile by username
/// - `GET /people?q=` - Search by username or display name

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use berth_shared::{
    auth::AuthContext,
    models::{NewProfile, Profile, UpdateProfile},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Upper bound on search results
const MAX_SEARCH_RESULTS: usize = 50;

/// Update profile request
///
/// Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,

    #[validate(length(max = 80, message = "Display name must be at most 80 characters"))]
    pub display_name: Option<String>,

    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    pub bio: Option<String>,

    #[validate(url(message = "Picture must be a URL"))]
    pub picture: Option<String>,

    #[validate(length(max = 200, message = "Street must be at most 200 characters"))]
    pub street: Option<String>,

    #[validate(length(max = 100, message = "City must be at most 100 characters"))]
    pub city: Option<String>,

    #[validate(length(max = 100, message = "State must be at most 100 characters"))]
    pub state: Option<String>,

    #[validate(length(max = 20, message = "Zip code must be at most 20 characters"))]
    pub zip_code: Option<String>,

    #[validate(length(max = 100, message = "Country must be at most 100 characters"))]
    pub country: Option<String>,
}

impl From<UpdateProfileRequest> for UpdateProfile {
    fn from(req: UpdateProfileRequest) -> Self {
        UpdateProfile {
            email: req.email,
            display_name: req.display_name,
            bio: req.bio,
            picture: req.picture,
            street: req.street,
            city: req.city,
            state: req.state,
            zip_code: req.zip_code,
            country: req.country,
        }
    }
}

/// People search query
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,

    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub people: Vec<Profile>,
}

/// Returns the caller's profile, creating it from the token on first use
///
/// A changed `preferred_username` is written back; other fields the user
/// edited are kept. Fails with 409 when another subject already holds the
/// username, which includes a second token falling back to `anonymous`.
async fn ensure_profile(state: &AppState, auth: &AuthContext) -> ApiResult<Profile> {
    if let Some(profile) = state.profiles.get(&auth.user_id).await? {
        if profile.username == auth.username {
            return Ok(profile);
        }
    }

    let profile = state
        .profiles
        .upsert(NewProfile {
            id: auth.user_id.clone(),
            username: auth.username.clone(),
            email: auth.email.clone(),
            display_name: auth.name.clone(),
        })
        .await?;

    tracing::debug!(user_id = %auth.user_id, username = %auth.username, "Profile synced from token");
    Ok(profile)
}

/// Own profile
///
/// # Endpoint
///
/// ```text
/// GET /profile
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// ```json
/// {
///   "id": "f1c2...",
///   "username": "ada",
///   "email": "ada@example.org",
///   "display_name": "Ada Lovelace",
///   "bio": null,
///   ...
/// }
/// ```
pub async fn get_own_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Profile>> {
    Ok(Json(ensure_profile(&state, &auth).await?))
}

/// Update own profile
///
/// # Endpoint
///
/// ```text
/// PUT /profile
/// Authorization: Bearer <token>
/// Content-Type: application/json
///
/// { "city": "Lisbon", "bio": "hi" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: No fields given
/// - `422 Unprocessable Entity`: Validation failed
pub async fn update_own_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    req.validate()?;

    let update = UpdateProfile::from(req);
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    ensure_profile(&state, &auth).await?;
    let profile = state.profiles.update(&auth.user_id, update).await?;

    tracing::info!(user_id = %auth.user_id, "Profile updated");
    Ok(Json(profile))
}

/// Profile by subject
///
/// ```text
/// GET /profile/:user_id
/// ```
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Profile>> {
    state
        .profiles
        .get(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

/// Profile by username
///
/// ```text
/// GET /users/:username
/// ```
pub async fn get_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Profile>> {
    state
        .profiles
        .get_by_username(&username)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Search people
///
/// ```text
/// GET /people?q=ada&limit=20
/// ```
///
/// Matches usernames and display names case-insensitively. An empty query
/// lists everyone up to the limit.
pub async fn search_people(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let limit = query
        .limit
        .unwrap_or(MAX_SEARCH_RESULTS)
        .clamp(1, MAX_SEARCH_RESULTS);
    let people = state.profiles.search(query.q.trim(), limit).await?;
    Ok(Json(SearchResponse { people }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_validation() {
        let req = UpdateProfileRequest {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateProfileRequest {
            city: Some("Lisbon".to_string()),
            picture: Some("https://cdn.example.org/a.png".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_empty_request_converts_to_empty_update() {
        assert!(UpdateProfile::from(UpdateProfileRequest::default()).is_empty());
    }
}
