//! Administrative token operations.

use crate::errors::{AuthError, TokenError};
use crate::middleware::AuthenticatedUser;
use crate::models::RevokeTokenRequest;
use crate::observability::hash_for_correlation;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Revoke any token this service issued.
///
/// POST /api/v1/admin/tokens/revoke
///
/// Requires the admin role. An already-expired token is accepted and nothing
/// is written; a token this service cannot verify is rejected with 400.
#[instrument(skip_all, name = "auth.handler.admin_revoke")]
pub async fn handle_revoke_token(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthenticatedUser>,
    Json(payload): Json<RevokeTokenRequest>,
) -> Result<StatusCode, AuthError> {
    let claims = match state.verifier.verify(&payload.token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => return Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            tracing::debug!(target: "auth.handler", reason = e.as_str(), "Admin revoke target rejected");
            return Err(AuthError::InvalidRequest("Token is invalid".to_string()));
        }
    };

    let revoked = state
        .revocation
        .revoke_for_remaining_lifetime(&payload.token, &claims)
        .await?;

    tracing::info!(
        target: "auth.handler",
        admin = %hash_for_correlation(&admin.claims.sub),
        subject = %hash_for_correlation(&claims.sub),
        jti = %claims.jti,
        token_use = claims.token_use.as_str(),
        revoked,
        "Token revoked by admin"
    );

    Ok(StatusCode::NO_CONTENT)
}
