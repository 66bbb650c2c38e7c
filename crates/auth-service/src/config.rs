//! Auth service configuration.
//!
//! Configuration is loaded from environment variables. Key material itself is
//! read by [`crate::keys::KeyLoader`]; this module only decides where keys come
//! from and how long they are trusted.

use crate::keys::{
    KeyRetentionPolicy, KeySourceSettings, SecretLookup, DEFAULT_KEYS_SECRET_ID,
    DEFAULT_KEY_CACHE_TTL,
};
use crate::services::rate_limiter::RateLimitPolicies;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8083";

pub const DEFAULT_JWT_CLOCK_SKEW_SECONDS: u64 = DEFAULT_CLOCK_SKEW.as_secs();
pub const MAX_JWT_CLOCK_SKEW_SECONDS: u64 = MAX_CLOCK_SKEW.as_secs();

/// Floor for `JWT_KEY_CACHE_TTL_SECS`, to keep the secret source from being
/// polled in a tight loop.
pub const MIN_KEY_CACHE_TTL_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8083").
    pub bind_address: String,

    /// Shared cache for revocation and rate limiting. Required unless
    /// `allow_local_cache` is set.
    pub redis_url: Option<String>,

    /// Run with a process-local cache when `REDIS_URL` is unset
    /// (`AUTH_ALLOW_LOCAL_CACHE`). Development and single-replica use only:
    /// revocations are not seen by other replicas.
    pub allow_local_cache: bool,

    /// Tolerance for `iat` in the future.
    pub jwt_clock_skew: Duration,

    /// How long a loaded key set is served before it is re-read.
    pub key_cache_ttl: Duration,

    pub key_sources: KeySourceSettings,

    pub secret_source_url: Option<String>,

    pub secret_source_token: Option<SecretString>,

    pub rate_limits: RateLimitPolicies,

    /// Take the client address from the first `X-Forwarded-For` hop. Only
    /// safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("allow_local_cache", &self.allow_local_cache)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("key_cache_ttl", &self.key_cache_ttl)
            .field("key_sources", &self.key_sources)
            .field("secret_source_url", &self.secret_source_url)
            .field(
                "secret_source_token",
                &self.secret_source_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rate_limits", &self.rate_limits)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let redis_url = non_empty(vars, "REDIS_URL");
        let allow_local_cache = match vars.get("AUTH_ALLOW_LOCAL_CACHE") {
            Some(raw) => parse_bool("AUTH_ALLOW_LOCAL_CACHE", raw)?,
            None => false,
        };
        if redis_url.is_none() && !allow_local_cache {
            return Err(ConfigError::MissingEnvVar("REDIS_URL".to_string()));
        }

        let clock_skew_secs = match vars.get("JWT_CLOCK_SKEW_SECONDS") {
            Some(raw) => {
                let value = parse_u64("JWT_CLOCK_SKEW_SECONDS", raw)?;
                if value == 0 {
                    return Err(invalid(
                        "JWT_CLOCK_SKEW_SECONDS",
                        "must be positive".to_string(),
                    ));
                }
                if value > MAX_JWT_CLOCK_SKEW_SECONDS {
                    return Err(invalid(
                        "JWT_CLOCK_SKEW_SECONDS",
                        format!(
                            "must not exceed {} seconds, got {}",
                            MAX_JWT_CLOCK_SKEW_SECONDS, value
                        ),
                    ));
                }
                value
            }
            None => DEFAULT_JWT_CLOCK_SKEW_SECONDS,
        };

        let key_cache_ttl = match vars.get("JWT_KEY_CACHE_TTL_SECS") {
            Some(raw) => {
                let value = parse_u64("JWT_KEY_CACHE_TTL_SECS", raw)?;
                if value < MIN_KEY_CACHE_TTL_SECONDS {
                    return Err(invalid(
                        "JWT_KEY_CACHE_TTL_SECS",
                        format!(
                            "must be at least {} seconds, got {}",
                            MIN_KEY_CACHE_TTL_SECONDS, value
                        ),
                    ));
                }
                Duration::from_secs(value)
            }
            None => DEFAULT_KEY_CACHE_TTL,
        };

        let secret_source_url = non_empty(vars, "SECRET_SOURCE_URL");
        let secret_source_token = non_empty(vars, "SECRET_SOURCE_TOKEN").map(SecretString::from);

        let secret_lookup = match non_empty(vars, "JWT_KEYS_SECRET_ID") {
            Some(secret_id) => {
                if secret_source_url.is_none() {
                    return Err(ConfigError::MissingEnvVar(
                        "SECRET_SOURCE_URL".to_string(),
                    ));
                }
                SecretLookup::Required(secret_id)
            }
            None if secret_source_url.is_some() => {
                SecretLookup::Optional(DEFAULT_KEYS_SECRET_ID.to_string())
            }
            None => SecretLookup::Disabled,
        };

        let grace_period = match vars.get("JWT_KEY_GRACE_PERIOD_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_u64(
                "JWT_KEY_GRACE_PERIOD_SECS",
                raw,
            )?)),
            None => None,
        };

        let purge_retired_private_keys = match vars.get("JWT_PURGE_RETIRED_PRIVATE_KEYS") {
            Some(raw) => parse_bool("JWT_PURGE_RETIRED_PRIVATE_KEYS", raw)?,
            None => true,
        };

        let trust_forwarded_for = match vars.get("TRUST_FORWARDED_FOR") {
            Some(raw) => parse_bool("TRUST_FORWARDED_FOR", raw)?,
            None => false,
        };

        let rate_limits = RateLimitPolicies::from_vars(vars)?;

        Ok(Config {
            bind_address,
            redis_url,
            allow_local_cache,
            jwt_clock_skew: Duration::from_secs(clock_skew_secs),
            key_cache_ttl,
            key_sources: KeySourceSettings {
                secret_lookup,
                retention: KeyRetentionPolicy {
                    grace_period,
                    purge_retired_private_keys,
                },
            },
            secret_source_url,
            secret_source_token,
            rate_limits,
            trust_forwarded_for,
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn invalid(var: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        reason,
    }
}

fn parse_u64(var: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| {
        invalid(
            var,
            format!("must be a non-negative integer, got '{}': {}", raw, e),
        )
    })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(invalid(var, format!("expected true or false, got '{}'", other))),
    }
}
