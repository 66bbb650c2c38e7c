//! In-process [`SharedCache`] for development and tests.
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused clock
//! can advance time past a TTL deterministically.

use super::{CacheError, SharedCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<Entries>,
}

/// Writes between sweeps of expired entries.
const SWEEP_EVERY_WRITES: u64 = 256;

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    writes_since_sweep: u64,
}

impl Entries {
    /// Drop expired entries every [`SWEEP_EVERY_WRITES`] writes, so keys that
    /// are written once and never read again do not accumulate.
    fn note_write(&mut self, now: Instant) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_EVERY_WRITES {
            self.map.retain(|_, e| e.is_live(now));
            self.writes_since_sweep = 0;
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries held, including expired ones not yet swept.
    pub async fn stored_entries(&self) -> usize {
        self.entries.lock().await.map.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .map
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn insert(&self, key: &str, value: &str, expires_at: Option<Instant>) {
        let mut entries = self.entries.lock().await;
        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        entries.note_write(Instant::now());
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.insert(key, value, None).await;
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.insert(key, value, Some(Instant::now() + ttl)).await;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.map.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        entries.note_write(now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.map.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.note_write(now);

        let entry = entries
            .map
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    e.value = "0".to_string();
                    e.expires_at = None;
                }
            })
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: None,
            });

        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| CacheError::InvalidValue(format!("{key} is not a counter")))?
            .saturating_add(1);

        entry.value = count.to_string();
        if entry.expires_at.is_none() {
            entry.expires_at = Some(now + window);
        }

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .map
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}
