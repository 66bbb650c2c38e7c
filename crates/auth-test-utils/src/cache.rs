//! Shared cache test doubles

use async_trait::async_trait;
use auth_service::cache::{CacheError, InMemoryCache, SharedCache};
use std::time::Duration;

/// A cache whose backend is always down.
///
/// Revocation checks against it must fail closed; rate limiting must fail
/// open.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCache;

impl FailingCache {
    fn down<T>() -> Result<T, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl SharedCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Self::down()
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
        Self::down()
    }

    async fn set_with_expiry(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Self::down()
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Self::down()
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Self::down()
    }

    async fn increment(&self, _key: &str, _window: Duration) -> Result<u64, CacheError> {
        Self::down()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, CacheError> {
        Self::down()
    }
}

/// An in-memory cache that yields to the scheduler before every operation,
/// the way a network round-trip would.
///
/// Lets concurrent tasks interleave between a read and the write that
/// depends on it.
#[derive(Default)]
pub struct YieldingCache {
    inner: InMemoryCache,
}

impl YieldingCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for YieldingCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        tokio::task::yield_now().await;
        self.inner.set_with_expiry(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        tokio::task::yield_now().await;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        tokio::task::yield_now().await;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        tokio::task::yield_now().await;
        self.inner.increment(key, window).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        tokio::task::yield_now().await;
        self.inner.ttl(key).await
    }
}
