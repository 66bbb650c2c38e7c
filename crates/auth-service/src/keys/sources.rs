//! Key set sources and source selection.
//!
//! Selection order: a configured secret id reads from the secret source, else
//! `JWT_KEYS_JSON` is parsed as a key set document, else the single-key
//! environment variables are used.

use super::{
    KeyConfig, KeyEntry, KeyRetentionPolicy, KeyStoreError, SecretSource, DEFAULT_ACTIVE_KID,
};
use crate::crypto::normalize_key_material;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const ENV_ACTIVE_KID: &str = "JWT_ACTIVE_KID";
pub const ENV_PRIVATE_KEY: &str = "JWT_PRIVATE_KEY";
pub const ENV_PUBLIC_KEY: &str = "JWT_PUBLIC_KEY";
pub const ENV_ADDITIONAL_PUBLIC_KEYS: &str = "JWT_ADDITIONAL_PUBLIC_KEYS";
pub const ENV_KEYS_JSON: &str = "JWT_KEYS_JSON";

/// Secret id tried when a secret source URL is configured without an explicit
/// `JWT_KEYS_SECRET_ID`.
pub const DEFAULT_KEYS_SECRET_ID: &str = "auth/jwt-signing-keys";

/// Whether and how the secret source is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretLookup {
    /// No secret source; local sources only.
    Disabled,
    /// Try this secret id and silently fall back to local sources on failure.
    Optional(String),
    /// Explicitly configured secret id. Failure is fatal.
    Required(String),
}

#[derive(Debug, Clone)]
pub struct KeySourceSettings {
    pub secret_lookup: SecretLookup,
    pub retention: KeyRetentionPolicy,
}

impl Default for KeySourceSettings {
    fn default() -> Self {
        Self {
            secret_lookup: SecretLookup::Disabled,
            retention: KeyRetentionPolicy::default(),
        }
    }
}

/// Which source produced a key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySourceKind {
    SecretSource,
    JsonBlob,
    Environment,
}

impl KeySourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySourceKind::SecretSource => "secret_source",
            KeySourceKind::JsonBlob => "json_blob",
            KeySourceKind::Environment => "environment",
        }
    }
}

type EnvReader = Arc<dyn Fn() -> HashMap<String, String> + Send + Sync>;

/// Loads a [`KeyConfig`] from the configured source.
///
/// Environment variables are re-read on every load so a changed
/// `JWT_KEYS_JSON` or rotated PEM is picked up by the next refresh.
#[derive(Clone)]
pub struct KeyLoader {
    settings: KeySourceSettings,
    secret_source: Option<Arc<dyn SecretSource>>,
    env: EnvReader,
}

impl fmt::Debug for KeyLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLoader")
            .field("settings", &self.settings)
            .field("has_secret_source", &self.secret_source.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyLoader {
    /// Loader reading the process environment.
    pub fn new(settings: KeySourceSettings, secret_source: Option<Arc<dyn SecretSource>>) -> Self {
        Self {
            settings,
            secret_source,
            env: Arc::new(|| std::env::vars().collect()),
        }
    }

    /// Replace the environment reader (for testing).
    #[must_use]
    pub fn with_env_reader<F>(mut self, reader: F) -> Self
    where
        F: Fn() -> HashMap<String, String> + Send + Sync + 'static,
    {
        self.env = Arc::new(reader);
        self
    }

    /// Use a fixed variable snapshot instead of the process environment.
    #[must_use]
    pub fn with_vars(self, vars: HashMap<String, String>) -> Self {
        self.with_env_reader(move || vars.clone())
    }

    /// Load, apply the retention policy, and return the config with its source.
    #[instrument(skip_all)]
    pub async fn load(&self) -> Result<(KeyConfig, KeySourceKind), KeyStoreError> {
        let (config, kind) = match &self.settings.secret_lookup {
            SecretLookup::Required(secret_id) => {
                let config = self.load_from_secret_source(secret_id).await?;
                (config, KeySourceKind::SecretSource)
            }
            SecretLookup::Optional(secret_id) => {
                match self.load_from_secret_source(secret_id).await {
                    Ok(config) => (config, KeySourceKind::SecretSource),
                    Err(e) => {
                        debug!(target: "auth.keys", error = %e, "Secret source unavailable, using local key sources");
                        self.load_local()?
                    }
                }
            }
            SecretLookup::Disabled => self.load_local()?,
        };

        let config = config.apply_retention(&self.settings.retention, Utc::now());
        config.validate()?;

        info!(
            target: "auth.keys",
            source = kind.as_str(),
            active_kid = %config.active_kid,
            key_count = config.entries.len(),
            "Key set read"
        );
        Ok((config, kind))
    }

    async fn load_from_secret_source(&self, secret_id: &str) -> Result<KeyConfig, KeyStoreError> {
        let source = self.secret_source.as_ref().ok_or_else(|| {
            KeyStoreError::SecretSource("no secret source is configured".to_string())
        })?;

        let document = source
            .fetch_secret(secret_id)
            .await
            .map_err(|e| KeyStoreError::SecretSource(e.to_string()))?;

        load_from_json_blob(&document)
    }

    fn load_local(&self) -> Result<(KeyConfig, KeySourceKind), KeyStoreError> {
        let vars = (self.env)();
        match vars.get(ENV_KEYS_JSON).filter(|v| !v.trim().is_empty()) {
            Some(document) => Ok((load_from_json_blob(document)?, KeySourceKind::JsonBlob)),
            None => Ok((load_from_environment(&vars)?, KeySourceKind::Environment)),
        }
    }
}

fn require_var<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str, KeyStoreError> {
    vars.get(name)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| KeyStoreError::MissingVar(name.to_string()))
}

fn normalize(kid: &str, raw: &str) -> Result<String, KeyStoreError> {
    normalize_key_material(raw).map_err(|e| KeyStoreError::material(kid, e))
}

fn normalize_secret(kid: &str, raw: &SecretString) -> Result<SecretString, KeyStoreError> {
    normalize(kid, raw.expose_secret()).map(SecretString::from)
}

/// Build a key set from the single-key environment variables.
///
/// `JWT_ADDITIONAL_PUBLIC_KEYS` may hold a JSON object of `kid -> PEM` for keys
/// from earlier rotations; they are verification-only.
pub fn load_from_environment(vars: &HashMap<String, String>) -> Result<KeyConfig, KeyStoreError> {
    let active_kid = vars
        .get(ENV_ACTIVE_KID)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTIVE_KID)
        .to_string();

    let private_key = normalize(&active_kid, require_var(vars, ENV_PRIVATE_KEY)?)?;
    let public_key = normalize(&active_kid, require_var(vars, ENV_PUBLIC_KEY)?)?;

    let mut entries = vec![KeyEntry {
        kid: active_kid.clone(),
        public_key,
        private_key: Some(SecretString::from(private_key)),
        retired_at: None,
    }];

    if let Some(raw) = vars
        .get(ENV_ADDITIONAL_PUBLIC_KEYS)
        .filter(|v| !v.trim().is_empty())
    {
        let additional: BTreeMap<String, String> = serde_json::from_str(raw).map_err(|e| {
            KeyStoreError::InvalidJson(format!("{ENV_ADDITIONAL_PUBLIC_KEYS}: {e}"))
        })?;

        for (kid, pem) in additional {
            if kid.trim().is_empty() {
                return Err(KeyStoreError::InvalidJson(format!(
                    "{ENV_ADDITIONAL_PUBLIC_KEYS}: empty kid"
                )));
            }
            if kid == active_kid {
                warn!(target: "auth.keys", kid = %kid, "Additional public key shadows the active kid, ignoring");
                continue;
            }
            entries.push(KeyEntry {
                public_key: normalize(&kid, &pem)?,
                kid,
                private_key: None,
                retired_at: None,
            });
        }
    }

    let config = KeyConfig {
        active_kid,
        entries,
    };
    config.validate()?;
    Ok(config)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeySetDocument {
    active_kid: String,
    keys: BTreeMap<String, KeyDocument>,
    #[serde(default)]
    previous: Vec<PreviousKeyDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyDocument {
    public_key: String,
    #[serde(default)]
    private_key: Option<SecretString>,
    #[serde(default)]
    retired_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviousKeyDocument {
    kid: String,
    #[serde(flatten)]
    key: KeyDocument,
}

/// Parse a key set document:
///
/// ```json
/// {
///   "activeKid": "2026-10",
///   "keys": { "2026-10": { "publicKey": "...", "privateKey": "..." } },
///   "previous": [ { "kid": "2026-07", "publicKey": "...", "retiredAt": "2026-10-01T00:00:00Z" } ]
/// }
/// ```
pub fn load_from_json_blob(document: &str) -> Result<KeyConfig, KeyStoreError> {
    let parsed: KeySetDocument =
        serde_json::from_str(document).map_err(|e| KeyStoreError::InvalidJson(e.to_string()))?;

    let active_kid = parsed.active_kid.trim().to_string();
    if active_kid.is_empty() {
        return Err(KeyStoreError::InvalidJson("activeKid is empty".to_string()));
    }

    let keyed = parsed.keys.into_iter();
    let previous = parsed.previous.into_iter().map(|p| (p.kid, p.key));

    let mut entries: Vec<KeyEntry> = Vec::new();
    for (kid, key) in keyed.chain(previous) {
        if kid.trim().is_empty() {
            return Err(KeyStoreError::InvalidJson("empty kid".to_string()));
        }
        if entries.iter().any(|e| e.kid == kid) {
            warn!(target: "auth.keys", kid = %kid, "Duplicate kid in key set, keeping first entry");
            continue;
        }
        let private_key = key
            .private_key
            .as_ref()
            .map(|pem| normalize_secret(&kid, pem))
            .transpose()?;
        entries.push(KeyEntry {
            public_key: normalize(&kid, &key.public_key)?,
            private_key,
            retired_at: key.retired_at,
            kid,
        });
    }

    let config = KeyConfig {
        active_kid,
        entries,
    };
    config.validate()?;
    Ok(config)
}
