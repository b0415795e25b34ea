//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs whose `sub` is the user id and whose `role` is one
//! of `admin`, `seller` or `customer`. [`RequireUser`] turns a valid
//! `Authorization: Bearer …` header into an [`Actor`].

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use oms_core::{Role, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AppError, set_sentry_user};
use crate::models::Actor;
use crate::state::AppState;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: Role,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Token errors.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token generation failed: {0}")]
    GenerationFailed(String),
}

/// Signs and verifies bearer tokens with the server's shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Issue a token for `actor` valid for `ttl`.
    ///
    /// Used by the CLI and by tests; end-user login lives elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::GenerationFailed` if signing fails.
    pub fn issue(&self, actor: &Actor, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: actor.user_id.to_string(),
            role: actor.role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::GenerationFailed(e.to_string()))
    }

    /// Verify a token and return the actor it names.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired` or `TokenError::Invalid`.
    pub fn verify(&self, token: &str) -> Result<Actor, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<i32>()
            .map_err(|_| TokenError::Invalid("subject is not a user id".to_string()))?;
        Ok(Actor::new(UserId::new(user_id), data.claims.role))
    }
}

/// Extractor that requires a valid bearer token.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireUser(actor): RequireUser) -> impl IntoResponse {
///     format!("Hello, user {}!", actor.user_id)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireUser(pub Actor);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let actor = state.tokens().verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized(e.to_string())
        })?;

        tracing::Span::current().record("user_id", actor.user_id.as_i32());
        set_sentry_user(&actor.user_id, &actor.role.to_string());

        Ok(Self(actor))
    }
}
