#![no_main]

use auth_service::keys::{KeyConfig, KeyEntry, KeyStore};
use auth_service::services::TokenVerifier;
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const PUBLIC_KEY: &str = include_str!("../../../auth-test-utils/fixtures/keys/signing-key-1.pub.pem");
const OTHER_PUBLIC_KEY: &str =
    include_str!("../../../auth-test-utils/fixtures/keys/signing-key-2.pub.pem");

fn verifier() -> &'static TokenVerifier {
    static VERIFIER: OnceLock<TokenVerifier> = OnceLock::new();
    VERIFIER.get_or_init(|| {
        let entry = |kid: &str, pem: &str| KeyEntry {
            kid: kid.to_string(),
            public_key: pem.to_string(),
            private_key: None,
            retired_at: None,
        };
        let store = KeyStore::verification_only(KeyConfig {
            active_kid: "fuzz-1".to_string(),
            entries: vec![entry("fuzz-1", PUBLIC_KEY), entry("fuzz-2", OTHER_PUBLIC_KEY)],
        })
        .expect("fixture public keys parse");
        TokenVerifier::new(Arc::new(store), Duration::from_secs(300))
    })
}

fuzz_target!(|data: &[u8]| {
    // Arbitrary input must be rejected with a tagged error, never a panic
    if let Ok(token) = std::str::from_utf8(data) {
        let verifier = verifier();
        let _ = verifier.verify(token);
        let _ = verifier.verify_access(token);
        let _ = TokenVerifier::decode_unverified(token);
    }
});
