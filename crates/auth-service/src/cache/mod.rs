//! Shared cache abstraction used by revocation and rate limiting.
//!
//! Production deployments share one Redis instance across replicas
//! ([`RedisCache`]). [`InMemoryCache`] is a single-process stand-in for local
//! development and tests; state written to it is not visible to other
//! replicas.

mod lua_scripts;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected cache value: {0}")]
    InvalidValue(String),
}

/// Key-value store with expiring entries and atomic counters.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), CacheError>;

    /// Write `key` with expiry `ttl` only if it does not already exist.
    /// Returns `true` when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically increment a counter, creating it with expiry `window` if it
    /// does not exist. Returns the post-increment value.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, CacheError>;

    /// Remaining time to live. `None` if the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}
