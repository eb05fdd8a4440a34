/// Bearer token authentication
///
/// Tokens are issued by the identity provider (a Keycloak realm) and checked
/// here before any request reaches a handler.
///
/// # Modules
///
/// - [`jwt`]: claims, token minting for development, and [`jwt::TokenVerifier`]
/// - [`context`]: the per-request [`context::AuthContext`] built from verified claims
///
/// # Example
///
/// ```
/// use berth_shared::auth::jwt::{create_token, Claims, TokenVerifier};
/// use berth_shared::auth::context::AuthContext;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "a-development-secret-of-32-bytes!";
/// let verifier = TokenVerifier::shared_secret(secret, "http://localhost:8080/realms/dev", "account");
///
/// let claims = Claims::new("sub-1", "ada", "http://localhost:8080/realms/dev", "account");
/// let token = create_token(&claims, secret)?;
///
/// let ctx = AuthContext::from_claims(verifier.verify(&token).await?);
/// assert_eq!(ctx.username, "ada");
/// # Ok(())
/// # }
/// ```

pub mod context;
pub mod jwt;

pub use context::{bearer_token, AuthContext};
pub use jwt::{issuer_for, Claims, JwtError, TokenVerifier};
