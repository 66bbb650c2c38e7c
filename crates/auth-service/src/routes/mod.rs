//! HTTP routes for the auth service.
//!
//! Defines the Axum router and application state.

use crate::cache::SharedCache;
use crate::config::Config;
use crate::handlers;
use crate::keys::KeyStore;
use crate::middleware::{rate_limit, require_auth, require_role, AuthState, RateLimitState};
use crate::models::Role;
use crate::services::{
    Authenticator, RateLimitScope, RateLimiter, RevocationStore, TokenIssuer, TokenVerifier,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Roles allowed on `/api/v1/admin/*`.
pub const ADMIN_ROLES: &[Role] = &[Role::Admin];

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,

    pub verifier: Arc<TokenVerifier>,

    /// Verifier plus revocation check, used by `require_auth`.
    pub authenticator: Arc<Authenticator>,

    pub revocation: Arc<RevocationStore>,

    pub rate_limiter: Arc<RateLimiter>,

    pub config: Config,
}

impl AppState {
    /// Wire the services over one key store and one shared cache.
    pub fn new(keys: Arc<KeyStore>, cache: Arc<dyn SharedCache>, config: Config) -> Self {
        let verifier = Arc::new(TokenVerifier::new(keys.clone(), config.jwt_clock_skew));
        let revocation = Arc::new(RevocationStore::new(cache.clone()));
        let authenticator = Arc::new(Authenticator::new(verifier.clone(), revocation.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(cache, config.rate_limits.clone()));

        Self {
            issuer: Arc::new(TokenIssuer::new(keys)),
            verifier,
            authenticator,
            revocation,
            rate_limiter,
            config,
        }
    }

    fn rate_limit_state(&self, scope: RateLimitScope) -> RateLimitState {
        RateLimitState {
            limiter: self.rate_limiter.clone(),
            scope,
            trust_forwarded_for: self.config.trust_forwarded_for,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/ready` - Readiness probe (signing key usable) - public
/// - `/metrics` - Prometheus metrics - public
/// - `/api/v1/auth/refresh` - Refresh token rotation - `refresh` rate limit
/// - `/api/v1/auth/logout` - Revoke the caller's tokens - authenticated
/// - `/api/v1/auth/me` - Caller identity - authenticated
/// - `/api/v1/admin/tokens/revoke` - Revoke any token - admin only
/// - `general` rate limit on every `/api/v1` route
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        authenticator: state.authenticator.clone(),
    });

    // Health check endpoints (unversioned operational endpoints)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Refresh authenticates with the body token, not a bearer header
    let refresh_routes = Router::new()
        .route("/api/v1/auth/refresh", post(handlers::handle_refresh))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit_state(RateLimitScope::Refresh),
            rate_limit,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/v1/auth/logout", post(handlers::handle_logout))
        .route("/api/v1/auth/me", get(handlers::handle_me))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ))
        .with_state(state.clone());

    // Layers run bottom-to-top: require_auth, then require_role
    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/tokens/revoke",
            post(handlers::handle_revoke_token),
        )
        .route_layer(middleware::from_fn_with_state(ADMIN_ROLES, require_role))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state.clone());

    let api_routes = refresh_routes
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            state.rate_limit_state(RateLimitScope::General),
            rate_limit,
        ));

    public_routes
        .merge(metrics_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
