/// Authenticated caller context
///
/// Built from verified [`Claims`] and inserted into request extensions by the
/// API's auth layer. Websocket connections build one after their `auth` frame.

use serde::{Deserialize, Serialize};

use super::jwt::{Claims, JwtError};

/// Username used when the token carries no `preferred_username`
pub const ANONYMOUS: &str = "anonymous";

/// Identity of the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Identity provider subject
    pub user_id: String,

    /// `preferred_username`, or [`ANONYMOUS`]
    pub username: String,

    pub email: Option<String>,

    /// Full name claim
    pub name: Option<String>,
}

impl AuthContext {
    /// Caller identity from verified claims
    ///
    /// Every token without `preferred_username` maps to [`ANONYMOUS`], and
    /// profile usernames are unique, so only the first such subject gets a
    /// profile. Later ones see a username conflict.
    pub fn from_claims(claims: Claims) -> Self {
        let username = claims
            .preferred_username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        Self {
            user_id: claims.sub,
            username,
            email: claims.email,
            name: claims.name,
        }
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value
///
/// # Errors
///
/// Returns `JwtError::InvalidFormat` when the scheme is not `Bearer` or the
/// token is empty.
pub fn bearer_token(header: &str) -> Result<&str, JwtError> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| JwtError::InvalidFormat("Expected Bearer token".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(JwtError::InvalidFormat("Empty bearer token".to_string()));
    }
    Ok(token)
}
