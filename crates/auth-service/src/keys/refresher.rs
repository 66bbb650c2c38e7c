//! TTL-gated, single-flight reloading of the key set.
//!
//! Only one reload runs at a time. Callers that queued behind a reload
//! re-check staleness once they hold the lock and return without reloading if
//! another caller already refreshed. A failed reload keeps the last good key
//! set and still resets the TTL, so a failing secret source is retried at
//! most once per TTL.
//!
//! The TTL is measured from the moment a load starts, so fetch latency never
//! stretches the age of the cached set past the TTL.

use super::{KeyLoader, KeyStore, KeyStoreError};
use crate::observability::metrics;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument};

/// Default key set cache lifetime.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached key set is still within its TTL; nothing was loaded.
    Fresh,
    /// Keys were reloaded but matched the current set.
    Unchanged,
    /// A new key set was published.
    Replaced,
}

pub struct KeyRefresher {
    store: Arc<KeyStore>,
    loader: KeyLoader,
    ttl: Duration,
    refresh_lock: Mutex<()>,
    last_refresh: ArcSwap<Instant>,
}

impl KeyRefresher {
    /// Load the initial key set. Any failure here is fatal to startup.
    pub async fn bootstrap(loader: KeyLoader, ttl: Duration) -> Result<Self, KeyStoreError> {
        let started = Instant::now();
        let (config, kind) = loader.load().await?;
        let store = Arc::new(KeyStore::new(config)?);
        info!(target: "auth.keys", source = kind.as_str(), "Initial key set loaded");
        let refresher = Self::new(store, loader, ttl);
        refresher.last_refresh.store(Arc::new(started));
        Ok(refresher)
    }

    /// Wrap an already-loaded store. The TTL starts now.
    pub fn new(store: Arc<KeyStore>, loader: KeyLoader, ttl: Duration) -> Self {
        Self {
            store,
            loader,
            ttl,
            refresh_lock: Mutex::new(()),
            last_refresh: ArcSwap::from_pointee(Instant::now()),
        }
    }

    pub fn store(&self) -> Arc<KeyStore> {
        Arc::clone(&self.store)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_stale(&self) -> bool {
        self.last_refresh.load().elapsed() >= self.ttl
    }

    /// Instant at which the cached set reaches its TTL.
    pub fn refresh_due_at(&self) -> Instant {
        **self.last_refresh.load() + self.ttl
    }

    /// Reload if the TTL has elapsed.
    #[instrument(skip_all)]
    pub async fn refresh_if_stale(&self) -> Result<RefreshOutcome, KeyStoreError> {
        if !self.is_stale() {
            return Ok(RefreshOutcome::Fresh);
        }

        let _guard = self.refresh_lock.lock().await;
        if !self.is_stale() {
            return Ok(RefreshOutcome::Fresh);
        }

        self.reload().await
    }

    /// Reload regardless of the TTL.
    #[instrument(skip_all)]
    pub async fn force_refresh(&self) -> Result<RefreshOutcome, KeyStoreError> {
        let _guard = self.refresh_lock.lock().await;
        self.reload().await
    }

    async fn reload(&self) -> Result<RefreshOutcome, KeyStoreError> {
        let started = Instant::now();
        let result = match self.loader.load().await {
            Ok((config, _)) => self.store.replace(config),
            Err(e) => Err(e),
        };
        self.last_refresh.store(Arc::new(started));

        match result {
            Ok(true) => {
                metrics::record_key_refresh("replaced");
                Ok(RefreshOutcome::Replaced)
            }
            Ok(false) => {
                metrics::record_key_refresh("unchanged");
                Ok(RefreshOutcome::Unchanged)
            }
            Err(e) => {
                metrics::record_key_refresh("error");
                error!(
                    target: "auth.keys",
                    error = %e,
                    active_kid = %self.store.active_kid(),
                    "Key refresh failed, keeping current key set"
                );
                Err(e)
            }
        }
    }
}

/// Run [`KeyRefresher::refresh_if_stale`] in the background.
///
/// The task wakes when the cached set reaches its TTL, or after `interval`
/// if that comes first. Errors are logged by the refresher; the task keeps
/// running until aborted.
pub fn spawn_key_refresh(refresher: Arc<KeyRefresher>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        loop {
            let wake_at = refresher.refresh_due_at().min(Instant::now() + interval);
            tokio::time::sleep_until(wake_at).await;
            if let Ok(RefreshOutcome::Replaced) = refresher.refresh_if_stale().await {
                info!(
                    target: "auth.keys",
                    active_kid = %refresher.store.active_kid(),
                    "Background key refresh published a new key set"
                );
            }
        }
    })
}
