//! # Authentication
//!
//! Bearer JWT identity for the skill routes. Tokens are HS256-signed and carry
//! the user id in the `id` claim.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::api::ApiError;
use crate::AppState;

/// Minimum accepted secret length outside dev mode
const MIN_SECRET_LEN: usize = 32;

/// Payload stored in a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier
    pub id: String,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a validator, rejecting empty or short secrets
    pub fn new(secret: String, expiry_seconds: u64) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least {} characters", MIN_SECRET_LEN);
        }
        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Validator with a fixed, well-known secret for local development
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    /// Issue a token for `user_id`
    pub fn generate_token(&self, user_id: &str) -> anyhow::Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = Claims {
            id: user_id.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Verify and decode a token
    pub fn verify_token(&self, token: &str) -> Result<Claims, &'static str> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Token validation failed",
            }
        })
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticated user id, extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(token) = extract_token_from_header(header) else {
            tracing::warn!(path = %parts.uri.path(), "Unauthorized access attempt - no token");
            return Err(ApiError::Unauthorized);
        };

        match state.jwt.verify_token(token) {
            Ok(claims) if !claims.id.is_empty() => Ok(AuthUser(claims.id)),
            Ok(_) => {
                tracing::warn!(path = %parts.uri.path(), "Token carries no user id");
                Err(ApiError::Unauthorized)
            }
            Err(reason) => {
                tracing::warn!(path = %parts.uri.path(), reason, "Rejected token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
