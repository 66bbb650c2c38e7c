//! Token lifecycle endpoints.

use crate::errors::{AuthError, TokenError};
use crate::middleware::AuthenticatedUser;
use crate::models::{
    CurrentUserResponse, LogoutRequest, RefreshRequest, TokenPairResponse,
};
use crate::observability::hash_for_correlation;
use crate::routes::AppState;
use crate::services::authorization;
use crate::services::token_issuer::ACCESS_TOKEN_TTL_SECONDS;
use crate::services::TokenSubject;
use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Rotate a refresh token.
///
/// POST /api/v1/auth/refresh
///
/// The presented refresh token is claimed (revoked for the rest of its
/// lifetime with an atomic set-if-absent) before the new pair is issued, so
/// each refresh token can be redeemed once even under concurrent requests.
/// A request that loses the claim gets the uniform 401. If the claim cannot
/// be recorded the request fails with 503 and no new tokens are issued.
#[instrument(skip_all, name = "auth.handler.refresh")]
pub async fn handle_refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let claims = state
        .authenticator
        .authenticate_refresh(&payload.refresh_token)
        .await?;

    let claimed = state
        .revocation
        .claim_for_remaining_lifetime(&payload.refresh_token, &claims)
        .await?;
    if !claimed {
        tracing::debug!(target: "auth.handler", jti = %claims.jti, "Refresh token already redeemed");
        return Err(AuthError::InvalidToken(TokenError::Revoked));
    }

    let pair = state.issuer.issue_token_pair(&TokenSubject::from(&claims))?;

    tracing::info!(
        target: "auth.handler",
        user = %hash_for_correlation(&claims.sub),
        old_jti = %claims.jti,
        new_jti = %pair.refresh.jti,
        "Refresh token rotated"
    );

    Ok(Json(TokenPairResponse {
        access_token: pair.access.token,
        refresh_token: pair.refresh.token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECONDS,
    }))
}

/// Revoke the caller's access token and, if supplied, their refresh token.
///
/// POST /api/v1/auth/logout
///
/// The body is optional. A supplied refresh token must belong to the caller;
/// one that has already expired or been revoked is accepted and ignored.
#[instrument(skip_all, name = "auth.handler.logout")]
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<StatusCode, AuthError> {
    state
        .revocation
        .revoke_for_remaining_lifetime(&user.token, &user.claims)
        .await?;

    let refresh_token = payload
        .and_then(|Json(body)| body.refresh_token)
        .filter(|t| !t.trim().is_empty());

    if let Some(refresh_token) = refresh_token {
        match state.verifier.verify_refresh(&refresh_token) {
            Ok(refresh_claims) => {
                if refresh_claims.sub != user.claims.sub {
                    return Err(AuthError::InvalidRequest(
                        "Refresh token does not belong to the caller".to_string(),
                    ));
                }
                state
                    .revocation
                    .revoke_for_remaining_lifetime(&refresh_token, &refresh_claims)
                    .await?;
            }
            Err(TokenError::Expired) => {}
            Err(e) => {
                tracing::debug!(target: "auth.handler", reason = e.as_str(), "Logout refresh token rejected");
                return Err(AuthError::InvalidRequest(
                    "Refresh token is invalid".to_string(),
                ));
            }
        }
    }

    tracing::info!(
        target: "auth.handler",
        user = %hash_for_correlation(&user.claims.sub),
        "User logged out"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Return the authenticated caller's identity.
///
/// GET /api/v1/auth/me
#[instrument(skip_all, name = "auth.handler.me")]
pub async fn handle_me(Extension(user): Extension<AuthenticatedUser>) -> Json<CurrentUserResponse> {
    let permissions = authorization::effective_permissions(&user.claims);
    let claims = user.claims;

    Json(CurrentUserResponse {
        user_id: claims.sub,
        role: claims.role,
        zone_id: claims.zone_id,
        device_id: claims.device_id,
        email: claims.email,
        permissions,
        expires_at: claims.exp,
    })
}
