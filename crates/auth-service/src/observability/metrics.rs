//! Metrics for the token lifecycle.
//!
//! Naming follows Prometheus conventions:
//! - `auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Every label value comes from a closed set:
//! - `token_use`: access, refresh
//! - `status`: success, error (plus replaced/unchanged for key refresh)
//! - `error_category`: the five token failure kinds, or `none`
//! - `result`: revoked, not_revoked, degraded
//! - `scope`: login, refresh, general
//! - `action`: allowed, rejected, degraded
//!
//! User ids, client addresses and token ids never appear as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder and return its render handle.
///
/// Fails if a recorder is already installed in this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Issuance is a single RSA signature; sub-10ms is the norm
        .set_buckets_for_metric(
            Matcher::Prefix("auth_token_issuance".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500,
            ],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Metric: `auth_token_issuance_total`, `auth_token_issuance_duration_seconds`
/// Labels: `token_use`, `status`
pub fn record_token_issuance(token_use: &str, status: &str, duration: Duration) {
    histogram!("auth_token_issuance_duration_seconds", "token_use" => token_use.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("auth_token_issuance_total", "token_use" => token_use.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Metric: `auth_token_validations_total`
/// Labels: `status`, `error_category`
pub fn record_token_validation(status: &str, error_category: Option<&str>) {
    let category = error_category.unwrap_or("none");
    counter!("auth_token_validations_total", "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

// ============================================================================
// Key Management Metrics
// ============================================================================

/// Metric: `auth_key_refresh_total`
/// Labels: `status` (replaced, unchanged, error)
pub fn record_key_refresh(status: &str) {
    counter!("auth_key_refresh_total", "status" => status.to_string()).increment(1);
}

/// Metric: `auth_known_signing_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_known_signing_keys(count: usize) {
    gauge!("auth_known_signing_keys").set(count as f64);
}

// ============================================================================
// Revocation Metrics
// ============================================================================

/// Metric: `auth_revocation_checks_total`
/// Labels: `result` (revoked, not_revoked, degraded)
///
/// ALERT: sustained `degraded` means every token is being rejected.
pub fn record_revocation_check(result: &str) {
    counter!("auth_revocation_checks_total", "result" => result.to_string()).increment(1);
}

/// Metric: `auth_revocations_total`
/// Labels: `status`
pub fn record_revocation(status: &str) {
    counter!("auth_revocations_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

/// Metric: `auth_rate_limit_decisions_total`
/// Labels: `scope`, `action` (allowed, rejected, degraded)
pub fn record_rate_limit_decision(scope: &str, action: &str) {
    counter!("auth_rate_limit_decisions_total", "scope" => scope.to_string(), "action" => action.to_string())
        .increment(1);
}
