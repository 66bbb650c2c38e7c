//! Rate limiting middleware keyed by client address.

use crate::errors::AuthError;
use crate::services::{RateLimitDecision, RateLimitScope, RateLimiter};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::instrument;

/// Client id used when neither a trusted forwarded header nor the socket
/// address is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub scope: RateLimitScope,
    pub trust_forwarded_for: bool,
}

/// Identify the client for rate limiting.
///
/// The first `X-Forwarded-For` hop is used only when `trust_forwarded_for` is
/// set; otherwise the peer address from `ConnectInfo`.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

/// Count the request against the configured scope.
///
/// # Response
///
/// - 429 with `Retry-After` once the client exceeds the scope's limit
/// - Otherwise continues to the next handler
#[instrument(skip_all, name = "auth.middleware.rate_limit", fields(scope = %state.scope))]
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_id = client_identifier(req.headers(), peer, state.trust_forwarded_for);

    match state.limiter.check(&client_id, state.scope).await {
        RateLimitDecision::Allowed { .. } => Ok(next.run(req).await),
        RateLimitDecision::Limited { retry_after } => Err(AuthError::RateLimitExceeded {
            retry_after_seconds: retry_after.as_secs(),
        }),
    }
}
