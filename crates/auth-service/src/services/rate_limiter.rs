//! Fixed-window rate limiting over the shared cache.
//!
//! Each `(scope, client)` pair owns one counter. The first request in a
//! window creates it with an expiry equal to the window length; the counter
//! vanishes when the window ends, which resets the limit.
//!
//! Counters live under `ratelimit:<scope>:<sha256 hex of client id>`; raw
//! client addresses are never written to the cache.
//!
//! The limiter fails open: if the cache is unreachable the request is
//! allowed and the condition is logged and counted.

use crate::cache::SharedCache;
use crate::config::ConfigError;
use crate::crypto::token_hash;
use crate::observability::{hash_for_correlation, metrics};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit:";

/// Shortest retry-after ever reported to a limited client.
pub const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Login,
    Refresh,
    General,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Login => "login",
            RateLimitScope::Refresh => "refresh",
            RateLimitScope::General => "general",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            RateLimitScope::Login => "RATE_LIMIT_LOGIN",
            RateLimitScope::Refresh => "RATE_LIMIT_REFRESH",
            RateLimitScope::General => "RATE_LIMIT_GENERAL",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Per-scope limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicies {
    pub login: RateLimitPolicy,
    pub refresh: RateLimitPolicy,
    pub general: RateLimitPolicy,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        Self {
            login: RateLimitPolicy::new(5, Duration::from_secs(15 * 60)),
            refresh: RateLimitPolicy::new(20, Duration::from_secs(15 * 60)),
            general: RateLimitPolicy::new(100, Duration::from_secs(60)),
        }
    }
}

impl RateLimitPolicies {
    pub fn for_scope(&self, scope: RateLimitScope) -> RateLimitPolicy {
        match scope {
            RateLimitScope::Login => self.login,
            RateLimitScope::Refresh => self.refresh,
            RateLimitScope::General => self.general,
        }
    }

    /// Apply `RATE_LIMIT_<SCOPE>_MAX` and `RATE_LIMIT_<SCOPE>_WINDOW_SECS`
    /// overrides to the defaults. Both must be positive integers.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            login: policy_from_vars(vars, RateLimitScope::Login, defaults.login)?,
            refresh: policy_from_vars(vars, RateLimitScope::Refresh, defaults.refresh)?,
            general: policy_from_vars(vars, RateLimitScope::General, defaults.general)?,
        })
    }
}

fn policy_from_vars(
    vars: &HashMap<String, String>,
    scope: RateLimitScope,
    default: RateLimitPolicy,
) -> Result<RateLimitPolicy, ConfigError> {
    let max_var = format!("{}_MAX", scope.env_prefix());
    let window_var = format!("{}_WINDOW_SECS", scope.env_prefix());

    let max_requests = match vars.get(&max_var) {
        Some(raw) => parse_positive(&max_var, raw)?,
        None => default.max_requests,
    };
    let window = match vars.get(&window_var) {
        Some(raw) => Duration::from_secs(parse_positive(&window_var, raw)?),
        None => default.window,
    };

    Ok(RateLimitPolicy::new(max_requests, window))
}

fn parse_positive(var: &str, raw: &str) -> Result<u64, ConfigError> {
    let value: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: format!("{e}"),
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u64 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

pub struct RateLimiter {
    cache: Arc<dyn SharedCache>,
    policies: RateLimitPolicies,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn SharedCache>, policies: RateLimitPolicies) -> Self {
        Self { cache, policies }
    }

    pub fn policies(&self) -> &RateLimitPolicies {
        &self.policies
    }

    /// Count one request from `client_id` against `scope`.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn check(&self, client_id: &str, scope: RateLimitScope) -> RateLimitDecision {
        let policy = self.policies.for_scope(scope);
        let key = counter_key(scope, client_id);

        let count = match self.cache.increment(&key, policy.window).await {
            Ok(count) => count,
            Err(e) => {
                metrics::record_rate_limit_decision(scope.as_str(), "degraded");
                tracing::warn!(
                    target: "auth.rate_limit",
                    scope = scope.as_str(),
                    error = %e,
                    "Rate limit store unavailable, allowing request"
                );
                return RateLimitDecision::Allowed {
                    remaining: policy.max_requests,
                };
            }
        };

        if count <= policy.max_requests {
            metrics::record_rate_limit_decision(scope.as_str(), "allowed");
            return RateLimitDecision::Allowed {
                remaining: policy.max_requests - count,
            };
        }

        let remaining_window = match self.cache.ttl(&key).await {
            Ok(Some(ttl)) => ttl.min(policy.window),
            Ok(None) => policy.window,
            Err(e) => {
                tracing::warn!(
                    target: "auth.rate_limit",
                    error = %e,
                    "Could not read rate limit window, assuming full window"
                );
                policy.window
            }
        };
        let retry_after = round_up_to_seconds(remaining_window).max(MIN_RETRY_AFTER);

        metrics::record_rate_limit_decision(scope.as_str(), "rejected");
        tracing::warn!(
            target: "auth.rate_limit",
            scope = scope.as_str(),
            client = %hash_for_correlation(client_id),
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );

        RateLimitDecision::Limited { retry_after }
    }
}

pub fn counter_key(scope: RateLimitScope, client_id: &str) -> String {
    format!(
        "{}{}:{}",
        RATE_LIMIT_KEY_PREFIX,
        scope.as_str(),
        token_hash(client_id)
    )
}

fn round_up_to_seconds(duration: Duration) -> Duration {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        Duration::from_secs(secs.saturating_add(1))
    } else {
        Duration::from_secs(secs)
    }
}
