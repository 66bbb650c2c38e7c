//! Authentication and role middleware for protected routes.
//!
//! `require_auth` extracts the Bearer token, authenticates it (signature,
//! expiry, revocation) and inserts an [`AuthenticatedUser`] into request
//! extensions. `require_role` runs after it and checks the caller's role.

use crate::errors::AuthError;
use crate::models::{Role, TokenClaims};
use crate::observability::hash_for_correlation;
use crate::services::authorization;
use crate::services::Authenticator;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<Authenticator>,
}

/// Caller identity placed in request extensions by [`require_auth`].
#[derive(Clone)]
pub struct AuthenticatedUser {
    pub claims: TokenClaims,
    /// The presented bearer token, kept so handlers can revoke it.
    pub token: String,
}

impl fmt::Debug for AuthenticatedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedUser")
            .field("claims", &self.claims)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Extract the Bearer token from the Authorization header.
pub fn extract_bearer_token(req: &Request) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "auth.middleware", "Missing Authorization header");
            AuthError::MissingCredentials
        })?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "auth.middleware", "Invalid Authorization header format");
            AuthError::MissingCredentials
        })
}

/// Authenticate the request's access token.
///
/// # Response
///
/// - 401 if the token is missing, invalid, expired or revoked
/// - Otherwise continues with [`AuthenticatedUser`] in extensions
#[instrument(skip_all, name = "auth.middleware.require_auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let token = extract_bearer_token(&req)?.to_string();

    let claims = state.authenticator.authenticate(&token).await.map_err(|e| {
        tracing::debug!(target: "auth.middleware", reason = e.as_str(), "Authentication failed");
        AuthError::InvalidToken(e)
    })?;

    req.extensions_mut()
        .insert(AuthenticatedUser { claims, token });

    Ok(next.run(req).await)
}

/// Reject callers whose role is not in `allowed`. Must run after
/// [`require_auth`].
#[instrument(skip_all, name = "auth.middleware.require_role")]
pub async fn require_role(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or(AuthError::MissingCredentials)?;

    if !authorization::has_role(&user.claims, allowed) {
        tracing::warn!(
            target: "auth.middleware",
            user = %hash_for_correlation(&user.claims.sub),
            role = %user.claims.role,
            "Role not permitted for route"
        );
        return Err(AuthError::InsufficientRole);
    }

    Ok(next.run(req).await)
}
