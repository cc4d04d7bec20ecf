//! Connection authentication.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the user's UUID. A token may
//! arrive in an `Authorization: Bearer` header, a `session` cookie, or a
//! `token` query parameter (browsers cannot set headers on WebSocket
//! upgrades). Requests without a valid token are rejected before any
//! session exists.

use std::time::Duration;

use axum::Json;
use axum::extract::{FromRequestParts, Query};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use palaver_core::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::server::AppState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Authentication failures. All map to `401 Unauthorized`.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token in header, cookie, or query.
    #[error("missing credentials")]
    MissingToken,
    /// Token failed signature, expiry, or format checks.
    #[error("invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    /// Token is valid but `sub` is not a user id.
    #[error("invalid subject")]
    InvalidSubject,
    /// Could not mint a token.
    #[error("could not issue token")]
    Issue(#[source] jsonwebtoken::errors::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        debug!(error = %self, "rejecting unauthenticated request");
        let status = match self {
            Self::Issue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Resolves a bearer token to a user id.
pub trait Authenticator: Send + Sync {
    /// Verify `token` and return the user it names.
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at time (Unix timestamp).
    pub iat: i64,
}

/// HS256 JWT authenticator.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    /// Build from a shared secret. Tokens minted by [`issue`](Self::issue) live for `ttl`.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    /// Mint a token for `user`.
    pub fn issue(&self, user: &UserId) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Issue)
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(AuthError::InvalidToken)?;
        data.claims.sub.parse().map_err(|_| AuthError::InvalidSubject)
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Find a token in the request, preferring header, then cookie, then query.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    from_header
        .or_else(|| {
            CookieJar::from_headers(&parts.headers)
                .get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_string())
        })
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token)
        })
        .filter(|token| !token.is_empty())
}

/// Extractor yielding the authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(AuthError::MissingToken)?;
        state.auth.authenticate(&token).map(AuthUser)
    }
}
