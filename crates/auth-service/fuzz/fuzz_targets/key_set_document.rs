#![no_main]

use auth_service::crypto::normalize_key_material;
use auth_service::keys::sources::load_from_json_blob;
use auth_service::keys::KeyStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = normalize_key_material(text);

        // A document that parses must either compile or fail cleanly
        if let Ok(config) = load_from_json_blob(text) {
            let _ = KeyStore::verification_only(config);
        }
    }
});
