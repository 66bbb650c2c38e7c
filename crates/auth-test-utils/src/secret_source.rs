//! In-process secret source for key loading tests

use async_trait::async_trait;
use auth_service::keys::{SecretSource, SecretSourceError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Secret source backed by a map, with a switchable failure mode.
///
/// # Example
/// ```rust,ignore
/// let source = Arc::new(StaticSecretSource::new());
/// source.set(TEST_SECRET_ID, &KeySetJsonBuilder::new(TEST_KEY_ID_1, 1).build());
/// let loader = KeyLoader::new(settings, Some(source.clone()));
/// ```
#[derive(Default)]
pub struct StaticSecretSource {
    secrets: Mutex<HashMap<String, String>>,
    failure: Mutex<Option<SecretSourceError>>,
    fetches: AtomicUsize,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the document served for `secret_id`.
    pub fn set(&self, secret_id: &str, document: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), document.to_string());
    }

    /// Make every fetch fail with `error` until [`Self::recover`] is called.
    pub fn fail_with(&self, error: SecretSourceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Number of fetches attempted so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch_secret(&self, secret_id: &str) -> Result<String, SecretSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        self.secrets
            .lock()
            .unwrap()
            .get(secret_id)
            .cloned()
            .ok_or_else(|| SecretSourceError::NotFound(secret_id.to_string()))
    }
}
