//! Key fixtures shared by unit tests.
//!
//! Integration tests use `auth-test-utils`; unit tests inside this crate read
//! the same PEM files directly so they do not depend on a second copy of the
//! crate's types.

use crate::keys::{KeyConfig, KeyEntry};
use common::secret::SecretString;

pub const PRIVATE_KEY_1: &str =
    include_str!("../../auth-test-utils/fixtures/keys/signing-key-1.pem");
pub const PUBLIC_KEY_1: &str =
    include_str!("../../auth-test-utils/fixtures/keys/signing-key-1.pub.pem");
pub const PRIVATE_KEY_2: &str =
    include_str!("../../auth-test-utils/fixtures/keys/signing-key-2.pem");
pub const PUBLIC_KEY_2: &str =
    include_str!("../../auth-test-utils/fixtures/keys/signing-key-2.pub.pem");
pub const PRIVATE_KEY_3: &str =
    include_str!("../../auth-test-utils/fixtures/keys/signing-key-3.pem");
pub const PUBLIC_KEY_3: &str =
    include_str!("../../auth-test-utils/fixtures/keys/signing-key-3.pub.pem");

/// Fixture pair by index (1-3).
pub fn key_pair(index: usize) -> (&'static str, &'static str) {
    match index {
        1 => (PRIVATE_KEY_1, PUBLIC_KEY_1),
        2 => (PRIVATE_KEY_2, PUBLIC_KEY_2),
        _ => (PRIVATE_KEY_3, PUBLIC_KEY_3),
    }
}

/// Entry holding both halves of fixture pair `index`.
pub fn signing_entry(kid: &str, index: usize) -> KeyEntry {
    let (private, public) = key_pair(index);
    KeyEntry {
        kid: kid.to_string(),
        public_key: public.to_string(),
        private_key: Some(SecretString::from(private.to_string())),
        retired_at: None,
    }
}

/// Entry holding only the public half of fixture pair `index`.
pub fn verification_entry(kid: &str, index: usize) -> KeyEntry {
    let (_, public) = key_pair(index);
    KeyEntry {
        kid: kid.to_string(),
        public_key: public.to_string(),
        private_key: None,
        retired_at: None,
    }
}

/// Config with `active` signing via pair 1 plus verification-only extras.
pub fn key_config(active: &str, extra: &[(&str, usize)]) -> KeyConfig {
    let mut entries = vec![signing_entry(active, 1)];
    entries.extend(extra.iter().map(|(kid, index)| verification_entry(kid, *index)));
    KeyConfig {
        active_kid: active.to_string(),
        entries,
    }
}
