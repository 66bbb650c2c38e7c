//! Deterministic cryptographic fixtures for testing
//!
//! Three fixed 2048-bit RSA key pairs live under `fixtures/keys/`. Private
//! keys are PKCS#1 PEM, public keys SPKI PEM, the formats the service
//! accepts from its key sources.

use auth_service::keys::{KeyConfig, KeyEntry, KeyStore};
use base64::{engine::general_purpose::STANDARD, Engine};
use common::secret::SecretString;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const TEST_PRIVATE_KEY_1: &str = include_str!("../fixtures/keys/signing-key-1.pem");
pub const TEST_PUBLIC_KEY_1: &str = include_str!("../fixtures/keys/signing-key-1.pub.pem");
pub const TEST_PRIVATE_KEY_2: &str = include_str!("../fixtures/keys/signing-key-2.pem");
pub const TEST_PUBLIC_KEY_2: &str = include_str!("../fixtures/keys/signing-key-2.pub.pem");
pub const TEST_PRIVATE_KEY_3: &str = include_str!("../fixtures/keys/signing-key-3.pem");
pub const TEST_PUBLIC_KEY_3: &str = include_str!("../fixtures/keys/signing-key-3.pub.pem");

/// Fixture pair `index` (1-3) as `(private_pem, public_pem)`.
///
/// # Panics
/// Panics on any other index.
pub fn test_key_pair(index: u8) -> (&'static str, &'static str) {
    match index {
        1 => (TEST_PRIVATE_KEY_1, TEST_PUBLIC_KEY_1),
        2 => (TEST_PRIVATE_KEY_2, TEST_PUBLIC_KEY_2),
        3 => (TEST_PRIVATE_KEY_3, TEST_PUBLIC_KEY_3),
        other => panic!("no fixture key pair {other}; use 1, 2 or 3"),
    }
}

/// Key entry for fixture pair `index`, optionally with its private half.
pub fn test_key_entry(kid: &str, index: u8, with_private_key: bool) -> KeyEntry {
    let (private, public) = test_key_pair(index);
    KeyEntry {
        kid: kid.to_string(),
        public_key: public.to_string(),
        private_key: with_private_key.then(|| SecretString::from(private.to_string())),
        retired_at: None,
    }
}

/// Single-key config signing with fixture pair 1.
pub fn test_key_config(active_kid: &str) -> KeyConfig {
    KeyConfig {
        active_kid: active_kid.to_string(),
        entries: vec![test_key_entry(active_kid, 1, true)],
    }
}

/// Key store signing with fixture pair 1 under `active_kid`.
pub fn test_key_store(active_kid: &str) -> Arc<KeyStore> {
    Arc::new(KeyStore::new(test_key_config(active_kid)).expect("fixture key config is valid"))
}

/// Environment variables describing a single active key for the
/// environment key source.
pub fn test_key_env_vars(active_kid: &str, index: u8) -> HashMap<String, String> {
    let (private, public) = test_key_pair(index);
    HashMap::from([
        ("JWT_ACTIVE_KID".to_string(), active_kid.to_string()),
        ("JWT_PRIVATE_KEY".to_string(), private.to_string()),
        ("JWT_PUBLIC_KEY".to_string(), public.to_string()),
    ])
}

/// Builder for key-set JSON documents as served by the secret source or
/// `JWT_KEYS_JSON`.
///
/// # Example
/// ```rust,ignore
/// let document = KeySetJsonBuilder::new("key-2", 2)
///     .with_previous("key-1", 1)
///     .base64_encoded()
///     .build();
/// ```
pub struct KeySetJsonBuilder {
    active_kid: String,
    keys: Map<String, Value>,
    previous: Vec<Value>,
    base64: bool,
}

impl KeySetJsonBuilder {
    /// Start a document whose active key is fixture pair `index`.
    pub fn new(active_kid: &str, index: u8) -> Self {
        Self {
            active_kid: active_kid.to_string(),
            keys: Map::new(),
            previous: Vec::new(),
            base64: false,
        }
        .with_key(active_kid, index, true)
    }

    /// Add an entry to the `keys` map.
    pub fn with_key(mut self, kid: &str, index: u8, with_private_key: bool) -> Self {
        let (private, public) = test_key_pair(index);
        let mut entry = json!({ "publicKey": public });
        if with_private_key {
            entry["privateKey"] = json!(private);
        }
        self.keys.insert(kid.to_string(), entry);
        self
    }

    /// Add a verification-only entry to the `previous` list.
    pub fn with_previous(mut self, kid: &str, index: u8) -> Self {
        let (_, public) = test_key_pair(index);
        self.previous.push(json!({ "kid": kid, "publicKey": public }));
        self
    }

    /// Add a `previous` entry retired at `retired_at` (RFC 3339).
    pub fn with_retired_previous(mut self, kid: &str, index: u8, retired_at: &str) -> Self {
        let (_, public) = test_key_pair(index);
        self.previous.push(json!({
            "kid": kid,
            "publicKey": public,
            "retiredAt": retired_at,
        }));
        self
    }

    /// Encode every PEM as `base64:<data>`.
    pub fn base64_encoded(mut self) -> Self {
        self.base64 = true;
        self
    }

    pub fn build(self) -> String {
        let encode = |value: &mut Value| {
            if let Some(pem) = value.as_str() {
                *value = json!(format!("base64:{}", STANDARD.encode(pem)));
            }
        };

        let mut keys = self.keys;
        let mut previous = self.previous;
        if self.base64 {
            for entry in keys.values_mut().chain(previous.iter_mut()) {
                for field in ["publicKey", "privateKey"] {
                    if let Some(value) = entry.get_mut(field) {
                        encode(value);
                    }
                }
            }
        }

        let mut document = json!({
            "activeKid": self.active_kid,
            "keys": keys,
        });
        if !previous.is_empty() {
            document["previous"] = json!(previous);
        }
        document.to_string()
    }
}
