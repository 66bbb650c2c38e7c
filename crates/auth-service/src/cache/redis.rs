//! Redis-backed [`SharedCache`].
//!
//! # Connection Pattern
//!
//! `MultiplexedConnection` is cheap to clone and safe to use concurrently, so
//! each operation clones it instead of sharing it behind a lock.

use super::lua_scripts;
use super::{CacheError, SharedCache};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::{error, instrument, warn};

#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    increment_script: Script,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// The URL is never logged since it may carry credentials.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "auth.cache", error = %e, "Failed to open Redis client");
            CacheError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "auth.cache", error = %e, "Failed to connect to Redis");
                CacheError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            increment_script: Script::new(lua_scripts::INCREMENT_WITH_EXPIRY),
        })
    }
}

fn unavailable(operation: &str, e: redis::RedisError) -> CacheError {
    warn!(target: "auth.cache", operation = operation, error = %e, "Redis operation failed");
    CacheError::Unavailable(format!("{operation} failed: {e}"))
}

/// Whole seconds for `SETEX`, never less than one.
fn expiry_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl SharedCache for RedisCache {
    #[instrument(skip_all)]
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(|e| unavailable("GET", e))
    }

    #[instrument(skip_all)]
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| unavailable("SET", e))
    }

    #[instrument(skip_all)]
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, expiry_seconds(ttl))
            .await
            .map_err(|e| unavailable("SETEX", e))
    }

    #[instrument(skip_all)]
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        // Nil reply when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(expiry_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("SET NX", e))?;
        Ok(reply.is_some())
    }

    #[instrument(skip_all)]
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| unavailable("DEL", e))
    }

    #[instrument(skip_all)]
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let mut conn = self.connection.clone();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);

        let count: i64 = self
            .increment_script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| unavailable("INCREMENT_WITH_EXPIRY", e))?;

        u64::try_from(count).map_err(|_| CacheError::InvalidValue(format!("counter is {count}")))
    }

    #[instrument(skip_all)]
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.connection.clone();
        let millis: i64 = conn.pttl(key).await.map_err(|e| unavailable("PTTL", e))?;

        // -2: missing, -1: no expiry
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}
