/// Bearer token verification
///
/// Production tokens are RS256-signed by the identity provider. The signing
/// keys are published as a JWKS document under the realm's OpenID Connect
/// endpoint and cached here; an unknown `kid` triggers one refetch so key
/// rotation is picked up without a restart.
///
/// For local development and tests a shared HS256 secret can stand in for the
/// identity provider. Both verifiers check expiry, issuer and audience the
/// same way.
///
/// # Validation
///
/// - **Algorithm**: RS256 (JWKS) or HS256 (shared secret), never mixed
/// - **Issuer**: `{issuer_base}/realms/{realm}`
/// - **Audience**: `account` unless configured otherwise
/// - **Expiry**: `exp` required, default 60s leeway
///
/// # Example
///
/// ```no_run
/// use berth_shared::auth::jwt::{issuer_for, TokenVerifier};
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let verifier = TokenVerifier::jwks(
///     "http://keycloak:8080",
///     issuer_for("https://auth.example.org", "chat"),
///     "chat",
///     "account",
/// );
/// let claims = verifier.verify(token).await?;
/// println!("caller: {}", claims.sub);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, jwk::JwkSet, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Error type for token operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Invalid issuer, expected {expected}")]
    InvalidIssuer { expected: String },

    #[error("Invalid audience")]
    InvalidAudience,

    /// No signing key with this `kid`, even after refetching the key set
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// The key set could not be retrieved
    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

/// Builds the issuer string for a realm
///
/// ```
/// use berth_shared::auth::jwt::issuer_for;
///
/// assert_eq!(
///     issuer_for("https://auth.example.org/", "chat"),
///     "https://auth.example.org/realms/chat"
/// );
/// ```
pub fn issuer_for(issuer_base: &str, realm: &str) -> String {
    format!("{}/realms/{}", issuer_base.trim_end_matches('/'), realm)
}

/// `aud` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(list) => list.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims read from identity provider tokens
///
/// Keycloak emits many more claims; only these are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (stable user ID)
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub iss: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

impl Claims {
    /// Creates claims valid for one hour
    pub fn new(
        sub: impl Into<String>,
        username: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self::with_expiration(sub, username, issuer, audience, Duration::hours(1))
    }

    pub fn with_expiration(
        sub: impl Into<String>,
        username: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.into(),
            preferred_username: Some(username.into()),
            email: None,
            name: None,
            iss: issuer.into(),
            aud: Some(Audience::One(audience.into())),
            exp: (now + expires_in).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
///
/// Only tokens checked by [`TokenVerifier::SharedSecret`] are minted this way.
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies bearer tokens
pub enum TokenVerifier {
    /// RS256 against the identity provider's published keys
    Jwks(JwksVerifier),

    /// HS256 with a shared secret
    SharedSecret(SharedSecretVerifier),
}

impl TokenVerifier {
    /// Verifier backed by the realm's JWKS endpoint
    ///
    /// `keycloak_url` is the address the API reaches the identity provider
    /// at, which may differ from the public `issuer`.
    pub fn jwks(
        keycloak_url: &str,
        issuer: impl Into<String>,
        realm: &str,
        audience: impl Into<String>,
    ) -> Self {
        TokenVerifier::Jwks(JwksVerifier::new(
            jwks_url(keycloak_url, realm),
            issuer.into(),
            audience.into(),
        ))
    }

    pub fn shared_secret(
        secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        TokenVerifier::SharedSecret(SharedSecretVerifier {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    /// Verifies a token and returns its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the signature, expiry, issuer or audience check
    /// fails, or if the signing key cannot be found.
    pub async fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        match self {
            TokenVerifier::Jwks(verifier) => verifier.verify(token).await,
            TokenVerifier::SharedSecret(verifier) => verifier.verify(token),
        }
    }

    pub fn issuer(&self) -> &str {
        match self {
            TokenVerifier::Jwks(verifier) => &verifier.issuer,
            TokenVerifier::SharedSecret(verifier) => &verifier.issuer,
        }
    }
}

/// Realm certificate endpoint
pub fn jwks_url(keycloak_url: &str, realm: &str) -> String {
    format!(
        "{}/realms/{}/protocol/openid-connect/certs",
        keycloak_url.trim_end_matches('/'),
        realm
    )
}

/// HS256 verifier
pub struct SharedSecretVerifier {
    secret: String,
    issuer: String,
    audience: String,
}

impl SharedSecretVerifier {
    fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let validation = validation(Algorithm::HS256, &self.issuer, &self.audience);
        decode_claims(token, &key, &validation, &self.issuer)
    }
}

/// RS256 verifier with a cached key set
pub struct JwksVerifier {
    jwks_url: String,
    issuer: String,
    audience: String,
    http: reqwest::Client,
    keys: RwLock<Option<JwkSet>>,
}

impl JwksVerifier {
    pub fn new(jwks_url: String, issuer: String, audience: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            jwks_url,
            issuer,
            audience,
            http,
            keys: RwLock::new(None),
        }
    }

    /// Starts with a known key set; an unknown `kid` still triggers a fetch
    pub fn with_keys(jwks_url: String, issuer: String, audience: String, keys: JwkSet) -> Self {
        let verifier = Self::new(jwks_url, issuer, audience);
        Self {
            keys: RwLock::new(Some(keys)),
            ..verifier
        }
    }

    async fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let header = decode_header(token).map_err(|e| JwtError::InvalidFormat(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(JwtError::InvalidFormat(format!(
                "Unsupported algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| JwtError::InvalidFormat("Token header has no kid".to_string()))?;

        let key = self.key_for(&kid).await?;
        let validation = validation(Algorithm::RS256, &self.issuer, &self.audience);
        decode_claims(token, &key, &validation, &self.issuer)
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, JwtError> {
        if let Some(key) = self.cached_key(kid).await? {
            return Ok(key);
        }

        tracing::debug!(kid, "Signing key not cached, refetching key set");
        self.refresh().await?;

        self.cached_key(kid)
            .await?
            .ok_or_else(|| JwtError::UnknownKey(kid.to_string()))
    }

    async fn cached_key(&self, kid: &str) -> Result<Option<DecodingKey>, JwtError> {
        let keys = self.keys.read().await;
        match keys.as_ref().and_then(|set| set.find(kid)) {
            Some(jwk) => DecodingKey::from_jwk(jwk)
                .map(Some)
                .map_err(|e| JwtError::InvalidFormat(format!("Unusable signing key: {}", e))),
            None => Ok(None),
        }
    }

    async fn refresh(&self) -> Result<(), JwtError> {
        let set: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| JwtError::KeyFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| JwtError::KeyFetch(e.to_string()))?;

        tracing::info!(keys = set.keys.len(), url = %self.jwks_url, "Fetched signing keys");
        *self.keys.write().await = Some(set);
        Ok(())
    }
}

fn validation(alg: Algorithm, issuer: &str, audience: &str) -> Validation {
    let mut validation = Validation::new(alg);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
    issuer: &str,
) -> Result<Claims, JwtError> {
    decode::<Claims>(token, key, validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
                expected: issuer.to_string(),
            },
            ErrorKind::InvalidAudience => JwtError::InvalidAudience,
            _ => JwtError::ValidationError(e.to_string()),
        })
}
