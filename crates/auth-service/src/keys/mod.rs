//! Signing and verification key management.
//!
//! A [`KeyStore`] holds the compiled key set behind an [`ArcSwap`], so readers
//! on the request path never block and never observe a half-applied rotation.
//! Loading is split out into [`sources`] (environment, JSON blob, secret
//! source) and periodic reloading into [`refresher`].

pub mod refresher;
pub mod secret_source;
pub mod sources;

use crate::crypto::{self, KeyMaterialError};
use crate::observability::metrics;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{DecodingKey, EncodingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub use refresher::{spawn_key_refresh, KeyRefresher, RefreshOutcome, DEFAULT_KEY_CACHE_TTL};
pub use secret_source::{HttpSecretSource, SecretSource, SecretSourceError};
pub use sources::{
    KeyLoader, KeySourceKind, KeySourceSettings, SecretLookup, DEFAULT_KEYS_SECRET_ID,
};

/// Default `kid` when `JWT_ACTIVE_KID` is not set.
pub const DEFAULT_ACTIVE_KID: &str = "default";

/// Key loading and selection failures. All of these are configuration
/// problems: fatal at boot, logged and skipped during a background refresh.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid key set document: {0}")]
    InvalidJson(String),

    #[error("Active key {0} is not present in the key set")]
    ActiveKeyMissing(String),

    #[error("Key {0} has no private key but is configured as the active signing key")]
    MissingPrivateKey(String),

    #[error("Key {kid} has invalid key material: {reason}")]
    InvalidKeyMaterial { kid: String, reason: String },

    #[error("Active key {0} private and public halves do not belong to the same pair")]
    KeyPairMismatch(String),

    #[error("Secret source error: {0}")]
    SecretSource(String),
}

impl KeyStoreError {
    fn material(kid: &str, err: KeyMaterialError) -> Self {
        KeyStoreError::InvalidKeyMaterial {
            kid: kid.to_string(),
            reason: err.to_string(),
        }
    }
}

/// The header `kid` names no key in the current set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown key id")]
pub struct UnknownKeyId;

/// One key as loaded from a source, before parsing.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub kid: String,
    /// PEM encoded public key.
    pub public_key: String,
    /// PEM encoded private key. Required for the active key only.
    pub private_key: Option<SecretString>,
    /// When the key stopped being the active key, if the source recorded it.
    pub retired_at: Option<DateTime<Utc>>,
}

/// An uncompiled key set: the active `kid` plus every known entry.
///
/// Entry order is preserved and determines verification order after the
/// header's own `kid`.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    pub active_kid: String,
    pub entries: Vec<KeyEntry>,
}

impl KeyConfig {
    pub fn get(&self, kid: &str) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| e.kid == kid)
    }

    /// Check the structural invariants every source must satisfy.
    pub fn validate(&self) -> Result<(), KeyStoreError> {
        let active = self
            .get(&self.active_kid)
            .ok_or_else(|| KeyStoreError::ActiveKeyMissing(self.active_kid.clone()))?;

        if active.private_key.is_none() {
            return Err(KeyStoreError::MissingPrivateKey(self.active_kid.clone()));
        }

        for entry in &self.entries {
            if entry.public_key.trim().is_empty() {
                return Err(KeyStoreError::material(&entry.kid, KeyMaterialError::Empty));
            }
        }

        Ok(())
    }

    /// Drop retired keys past their grace period and, if configured, discard
    /// private material for every non-active key.
    ///
    /// Keys without a `retired_at` timestamp are always retained.
    #[must_use]
    pub fn apply_retention(mut self, policy: &KeyRetentionPolicy, now: DateTime<Utc>) -> Self {
        let active_kid = self.active_kid.clone();

        if let Some(grace) = policy.grace_period {
            let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
            self.entries.retain(|entry| {
                let keep = entry.kid == active_kid
                    || entry
                        .retired_at
                        .map_or(true, |retired| now.signed_duration_since(retired) <= grace);
                if !keep {
                    info!(target: "auth.keys", kid = %entry.kid, "Dropping retired key past grace period");
                }
                keep
            });
        }

        if policy.purge_retired_private_keys {
            for entry in self.entries.iter_mut().filter(|e| e.kid != active_kid) {
                entry.private_key = None;
            }
        }

        self
    }

    /// Digest over every kid and key. Used to detect changed key material.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.active_kid.as_bytes());
        for entry in &self.entries {
            hasher.update([0u8]);
            hasher.update(entry.kid.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.public_key.as_bytes());
            if let Some(private) = &entry.private_key {
                hasher.update([1u8]);
                hasher.update(private.expose_secret().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// How long retired keys stay trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRetentionPolicy {
    /// `None` keeps retired keys until an operator removes them.
    pub grace_period: Option<Duration>,
    pub purge_retired_private_keys: bool,
}

impl Default for KeyRetentionPolicy {
    fn default() -> Self {
        Self {
            grace_period: None,
            purge_retired_private_keys: true,
        }
    }
}

/// Parsed private key of the active signing pair.
pub struct SigningKey {
    pub kid: String,
    pub key: EncodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Parsed public key for one `kid`.
pub struct VerificationKey {
    pub kid: String,
    pub key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

struct KeySet {
    active_kid: String,
    signing: Option<Arc<SigningKey>>,
    /// Active key first, then the remaining keys in source order.
    verification: Vec<Arc<VerificationKey>>,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
}

impl KeySet {
    fn compile(config: &KeyConfig, require_signing: bool) -> Result<Self, KeyStoreError> {
        let active = config
            .get(&config.active_kid)
            .ok_or_else(|| KeyStoreError::ActiveKeyMissing(config.active_kid.clone()))?;

        let ordered = std::iter::once(active).chain(
            config
                .entries
                .iter()
                .filter(|e| e.kid != config.active_kid),
        );

        let mut verification: Vec<Arc<VerificationKey>> = Vec::with_capacity(config.entries.len());
        for entry in ordered {
            if verification.iter().any(|k| k.kid == entry.kid) {
                continue;
            }
            let key = crypto::parse_verification_key(&entry.public_key)
                .map_err(|e| KeyStoreError::material(&entry.kid, e))?;
            verification.push(Arc::new(VerificationKey {
                kid: entry.kid.clone(),
                key,
            }));
        }

        let signing = match &active.private_key {
            Some(pem) => {
                let key = crypto::parse_signing_key(pem.expose_secret())
                    .map_err(|e| KeyStoreError::material(&active.kid, e))?;
                let public = verification
                    .first()
                    .ok_or_else(|| KeyStoreError::ActiveKeyMissing(active.kid.clone()))?;
                if !crypto::key_pair_matches(&key, &public.key) {
                    return Err(KeyStoreError::KeyPairMismatch(active.kid.clone()));
                }
                Some(Arc::new(SigningKey {
                    kid: active.kid.clone(),
                    key,
                }))
            }
            None if require_signing => {
                return Err(KeyStoreError::MissingPrivateKey(active.kid.clone()));
            }
            None => None,
        };

        Ok(Self {
            active_kid: config.active_kid.clone(),
            signing,
            verification,
            fingerprint: config.fingerprint(),
            loaded_at: Utc::now(),
        })
    }
}

/// Atomically swappable key set.
///
/// Readers take a lock-free snapshot; [`KeyStore::replace`] publishes a fully
/// compiled set or nothing.
pub struct KeyStore {
    current: ArcSwap<KeySet>,
    require_signing: bool,
}

impl KeyStore {
    /// Build a store that can sign. The active entry must carry a private key.
    pub fn new(config: KeyConfig) -> Result<Self, KeyStoreError> {
        Self::build(config, true)
    }

    /// Build a store for a process that only verifies tokens.
    ///
    /// [`KeyStore::signing_key`] fails on such a store if the active entry has
    /// no private key.
    pub fn verification_only(config: KeyConfig) -> Result<Self, KeyStoreError> {
        Self::build(config, false)
    }

    fn build(config: KeyConfig, require_signing: bool) -> Result<Self, KeyStoreError> {
        let set = KeySet::compile(&config, require_signing)?;
        metrics::set_known_signing_keys(set.verification.len());
        info!(
            target: "auth.keys",
            active_kid = %set.active_kid,
            key_count = set.verification.len(),
            "Key set loaded"
        );
        Ok(Self {
            current: ArcSwap::from_pointee(set),
            require_signing,
        })
    }

    /// Swap in a new key set if its material differs from the current one.
    ///
    /// Returns `Ok(true)` when a new set was published. On error the current
    /// set stays in place.
    pub fn replace(&self, config: KeyConfig) -> Result<bool, KeyStoreError> {
        if config.fingerprint() == self.current.load().fingerprint {
            return Ok(false);
        }

        let set = KeySet::compile(&config, self.require_signing)?;
        let previous_kid = self.current.load().active_kid.clone();
        metrics::set_known_signing_keys(set.verification.len());
        info!(
            target: "auth.keys",
            previous_active_kid = %previous_kid,
            active_kid = %set.active_kid,
            key_count = set.verification.len(),
            "Key set replaced"
        );
        self.current.store(Arc::new(set));
        Ok(true)
    }

    pub fn active_kid(&self) -> String {
        self.current.load().active_kid.clone()
    }

    /// The active signing key.
    pub fn signing_key(&self) -> Result<Arc<SigningKey>, KeyStoreError> {
        let set = self.current.load();
        set.signing
            .clone()
            .ok_or_else(|| KeyStoreError::MissingPrivateKey(set.active_kid.clone()))
    }

    /// Ordered verification candidates for a token.
    ///
    /// With a header `kid` the named key comes first, followed by every other
    /// known key. Without one, the active key comes first. A `kid` that names
    /// no known key fails with [`UnknownKeyId`].
    pub fn verification_candidates(
        &self,
        header_kid: Option<&str>,
    ) -> Result<Vec<Arc<VerificationKey>>, UnknownKeyId> {
        let set = self.current.load();
        match header_kid {
            None => Ok(set.verification.clone()),
            Some(kid) => {
                let named = set
                    .verification
                    .iter()
                    .find(|k| k.kid == kid)
                    .ok_or(UnknownKeyId)?;
                let mut candidates = Vec::with_capacity(set.verification.len());
                candidates.push(Arc::clone(named));
                candidates.extend(set.verification.iter().filter(|k| k.kid != kid).cloned());
                Ok(candidates)
            }
        }
    }

    pub fn known_kids(&self) -> Vec<String> {
        self.current
            .load()
            .verification
            .iter()
            .map(|k| k.kid.clone())
            .collect()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.current.load().verification.iter().any(|k| k.kid == kid)
    }

    pub fn fingerprint(&self) -> String {
        self.current.load().fingerprint.clone()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.current.load().loaded_at
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.current.load();
        f.debug_struct("KeyStore")
            .field("active_kid", &set.active_kid)
            .field("key_count", &set.verification.len())
            .field("can_sign", &set.signing.is_some())
            .finish()
    }
}
