//! Liveness and readiness probes.
//!
//! - `/health`: the process is running
//! - `/ready`: the active signing key is loaded and usable

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe. Checks nothing beyond the process answering.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe.
///
/// Returns 503 when the service could not sign a token right now, for
/// example when only verification keys are loaded. The reason is logged, not
/// returned.
#[tracing::instrument(skip_all, name = "auth.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.issuer.check_ready() {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                signing_key: Some("available"),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(target: "auth.health", error = %e, "Readiness check failed: signing key unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    signing_key: Some("unavailable"),
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
    }
}
