use crate::cache::CacheError;
use crate::keys::KeyStoreError;
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic rejection message for every token failure.
///
/// The concrete reason (expired, unknown key, bad signature, ...) is logged at
/// debug level only and never returned to the caller.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Per-request token failure.
///
/// This is the tagged outcome of verification and authentication. None of
/// these are fatal; they all map to a uniform 401.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token signature did not verify")]
    InvalidSignature,

    #[error("token signed by an unknown key")]
    UnknownKey,

    #[error("token malformed")]
    Malformed,

    #[error("token revoked")]
    Revoked,
}

impl TokenError {
    /// Bounded label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenError::Expired => "expired",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::UnknownKey => "unknown_key",
            TokenError::Malformed => "malformed",
            TokenError::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(TokenError),

    #[error("Missing or malformed Authorization header")]
    MissingCredentials,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Dependency degraded: {0}")]
    DependencyDegraded(String),

    #[error("Internal server error")]
    Internal,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::InvalidToken(err)
    }
}

impl From<KeyStoreError> for AuthError {
    fn from(err: KeyStoreError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        AuthError::DependencyDegraded(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after_seconds) = match &self {
            AuthError::InvalidToken(reason) => {
                tracing::debug!(target: "auth.errors", reason = reason.as_str(), "Rejecting token");
                (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    INVALID_TOKEN_MESSAGE.to_string(),
                    None,
                )
            }
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                INVALID_TOKEN_MESSAGE.to_string(),
                None,
            ),
            AuthError::InsufficientRole => (
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_ROLE",
                "The caller's role does not permit this operation".to_string(),
                None,
            ),
            AuthError::RateLimitExceeded {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests. Please try again later.".to_string(),
                Some(*retry_after_seconds),
            ),
            AuthError::InvalidRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                reason.clone(),
                None,
            ),
            AuthError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                "The service is misconfigured".to_string(),
                None,
            ),
            AuthError::Crypto(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CRYPTO_ERROR",
                "An internal cryptographic error occurred".to_string(),
                None,
            ),
            AuthError::DependencyDegraded(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "A required dependency is unavailable".to_string(),
                None,
            ),
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                retry_after_seconds,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
