//! Remote secret store holding the key set document.
//!
//! The store is reached over HTTP: `GET {base_url}/{secret_id}` with an
//! optional bearer token. The body is either the key set document itself or a
//! JSON envelope `{"secretString": "<document>"}`.

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Request timeout for secret fetches.
const SECRET_FETCH_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretSourceError {
    #[error("Secret source request failed: {0}")]
    Request(String),

    #[error("Secret {0} not found")]
    NotFound(String),

    #[error("Secret source returned status {0}")]
    Status(u16),

    #[error("Secret payload invalid: {0}")]
    InvalidPayload(String),
}

/// Anything that can return the raw key set document for a secret id.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch_secret(&self, secret_id: &str) -> Result<String, SecretSourceError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretEnvelope {
    secret_string: String,
}

/// HTTP client for the platform secret store.
pub struct HttpSecretSource {
    base_url: String,
    http_client: reqwest::Client,
    access_token: Option<SecretString>,
}

impl HttpSecretSource {
    pub fn new(base_url: String, access_token: Option<SecretString>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SECRET_FETCH_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "auth.keys", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            access_token,
        }
    }
}

#[async_trait]
impl SecretSource for HttpSecretSource {
    #[instrument(skip_all, fields(secret_id = %secret_id))]
    async fn fetch_secret(&self, secret_id: &str) -> Result<String, SecretSourceError> {
        let url = format!("{}/{}", self.base_url, secret_id);
        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(target: "auth.keys", error = %e, "Secret source request failed");
            SecretSourceError::Request(e.to_string())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SecretSourceError::NotFound(secret_id.to_string()));
        }
        if !status.is_success() {
            tracing::warn!(target: "auth.keys", status = %status, "Secret source returned error");
            return Err(SecretSourceError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SecretSourceError::Request(e.to_string()))?;

        if body.trim().is_empty() {
            return Err(SecretSourceError::InvalidPayload(
                "empty secret body".to_string(),
            ));
        }

        Ok(match serde_json::from_str::<SecretEnvelope>(&body) {
            Ok(envelope) => envelope.secret_string,
            Err(_) => body,
        })
    }
}
