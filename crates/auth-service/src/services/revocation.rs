//! Shared revocation list.
//!
//! A revoked token is recorded as `revoked:<sha256 hex of token>` with a TTL
//! equal to the token's remaining lifetime, so the entry disappears at the
//! moment the token would have expired anyway. The raw token is never
//! written to the cache.

use crate::cache::{CacheError, SharedCache};
use crate::crypto::token_hash;
use crate::models::TokenClaims;
use crate::observability::metrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub const REVOCATION_KEY_PREFIX: &str = "revoked:";

/// Shortest TTL written for a revocation entry.
pub const MIN_REVOCATION_TTL: Duration = Duration::from_secs(1);

pub fn revocation_key(token: &str) -> String {
    format!("{}{}", REVOCATION_KEY_PREFIX, token_hash(token))
}

pub struct RevocationStore {
    cache: Arc<dyn SharedCache>,
}

impl RevocationStore {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    /// Mark `token` revoked for `ttl`. A zero TTL is rounded up to one second.
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl = ttl.max(MIN_REVOCATION_TTL);
        let result = self
            .cache
            .set_with_expiry(&revocation_key(token), "1", ttl)
            .await;

        match &result {
            Ok(()) => {
                metrics::record_revocation("success");
                tracing::info!(target: "auth.revocation", ttl_secs = ttl.as_secs(), "Token revoked");
            }
            Err(e) => {
                metrics::record_revocation("error");
                tracing::error!(target: "auth.revocation", error = %e, "Failed to record revocation");
            }
        }
        result
    }

    /// Revoke `token` until its `exp`.
    ///
    /// Returns `Ok(false)` without writing anything if the token has already
    /// expired.
    pub async fn revoke_for_remaining_lifetime(
        &self,
        token: &str,
        claims: &TokenClaims,
    ) -> Result<bool, CacheError> {
        let remaining = claims.remaining_lifetime_secs(Utc::now().timestamp());
        if remaining == 0 {
            tracing::debug!(target: "auth.revocation", "Token already expired, nothing to revoke");
            return Ok(false);
        }

        self.revoke(token, Duration::from_secs(remaining)).await?;
        Ok(true)
    }

    /// Atomically revoke `token` until its `exp`, unless it is already revoked.
    ///
    /// Returns `Ok(true)` only for the one caller that recorded the
    /// revocation. Concurrent callers presenting the same token, or a token
    /// that has already expired, get `Ok(false)`. Used to make refresh tokens
    /// single-use.
    #[instrument(skip_all)]
    pub async fn claim_for_remaining_lifetime(
        &self,
        token: &str,
        claims: &TokenClaims,
    ) -> Result<bool, CacheError> {
        let remaining = claims.remaining_lifetime_secs(Utc::now().timestamp());
        if remaining == 0 {
            return Ok(false);
        }

        let ttl = Duration::from_secs(remaining).max(MIN_REVOCATION_TTL);
        let result = self
            .cache
            .set_if_absent(&revocation_key(token), "1", ttl)
            .await;

        match &result {
            Ok(true) => metrics::record_revocation("success"),
            Ok(false) => {
                tracing::debug!(target: "auth.revocation", "Token already claimed");
            }
            Err(e) => {
                metrics::record_revocation("error");
                tracing::error!(target: "auth.revocation", error = %e, "Failed to claim token");
            }
        }
        result
    }

    /// Whether `token` has been revoked.
    ///
    /// Fails closed: if the cache cannot be reached the token is treated as
    /// revoked.
    #[instrument(skip_all)]
    pub async fn is_revoked(&self, token: &str) -> bool {
        match self.cache.get(&revocation_key(token)).await {
            Ok(Some(_)) => {
                metrics::record_revocation_check("revoked");
                true
            }
            Ok(None) => {
                metrics::record_revocation_check("not_revoked");
                false
            }
            Err(e) => {
                metrics::record_revocation_check("degraded");
                tracing::error!(
                    target: "auth.revocation",
                    error = %e,
                    "Revocation check failed, rejecting token"
                );
                true
            }
        }
    }
}
