use duet_db::users::UserRow;
use duet_db::DbPool;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed, expired, or signature-invalid credential.
    #[error("invalid credential")]
    InvalidCredential,
    /// Credential parsed, but the referenced identity no longer exists.
    #[error("identity not found")]
    IdentityNotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable reason carried in the `auth_error` frame.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "InvalidCredential",
            Self::IdentityNotFound => "IdentityNotFound",
            Self::Internal(_) => "InternalError",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
    pub iat: usize,
}

pub fn create_token(user_id: i64, secret: &str, expiry_secs: u64) -> Result<String, AuthError> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + expiry_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidCredential)
}

/// Resolve a bearer credential to a stored identity. Stateless and safe
/// to call from any number of concurrent handshakes.
pub async fn resolve_identity(
    pool: &DbPool,
    token: &str,
    secret: &str,
) -> Result<UserRow, AuthError> {
    let claims = validate_token(token, secret)?;
    let user = duet_db::users::get_user_by_id(pool, claims.sub)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    user.ok_or(AuthError::IdentityNotFound)
}
