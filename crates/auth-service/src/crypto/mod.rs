use crate::errors::AuthError;
use crate::models::TokenClaims;
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::instrument;

/// The only signing algorithm accepted or produced.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// `alg` header value for [`SIGNING_ALGORITHM`].
pub const SIGNING_ALGORITHM_NAME: &str = "RS256";

/// Prefix marking key material that is base64 encoded PEM text.
pub const BASE64_KEY_PREFIX: &str = "base64:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyMaterialError {
    #[error("key material is empty")]
    Empty,

    #[error("base64 key material could not be decoded: {0}")]
    Base64(String),

    #[error("key material is not PEM encoded")]
    NotPem,

    #[error("key could not be parsed: {0}")]
    Unparseable(String),
}

/// Normalize key material as supplied by the environment or a key set blob.
///
/// Accepts raw PEM, PEM with literal `\n` escapes (common when a PEM is
/// squeezed into a single env var line), or `base64:` followed by the base64
/// encoding of the PEM text.
pub fn normalize_key_material(raw: &str) -> Result<String, KeyMaterialError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(KeyMaterialError::Empty);
    }

    let text = match trimmed.strip_prefix(BASE64_KEY_PREFIX) {
        Some(encoded) => {
            let bytes = general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| KeyMaterialError::Base64(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| KeyMaterialError::Base64(e.to_string()))?
        }
        None => trimmed.to_string(),
    };

    let pem = text.trim().replace("\\n", "\n");
    if !pem.contains("-----BEGIN") {
        return Err(KeyMaterialError::NotPem);
    }

    Ok(pem)
}

/// Parse an RSA private key (PKCS#1 or PKCS#8 PEM) for signing.
pub fn parse_signing_key(pem: &str) -> Result<EncodingKey, KeyMaterialError> {
    EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| KeyMaterialError::Unparseable(e.to_string()))
}

/// Parse an RSA public key (SPKI or PKCS#1 PEM) for verification.
pub fn parse_verification_key(pem: &str) -> Result<DecodingKey, KeyMaterialError> {
    DecodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| KeyMaterialError::Unparseable(e.to_string()))
}

/// Confirm a private key and public key belong to the same pair.
///
/// Signs a throwaway payload with `private` and verifies it with `public`.
pub fn key_pair_matches(private: &EncodingKey, public: &DecodingKey) -> bool {
    let header = Header::new(SIGNING_ALGORITHM);
    let Ok(probe) = encode(&header, &json!({ "probe": true }), private) else {
        return false;
    };

    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<serde_json::Value>(&probe, public, &validation).is_ok()
}

/// Sign claims with RS256, stamping `kid` into the header.
#[instrument(skip_all)]
pub fn sign_token(claims: &TokenClaims, key: &EncodingKey, kid: &str) -> Result<String, AuthError> {
    let mut header = Header::new(SIGNING_ALGORITHM);
    header.typ = Some("JWT".to_string());
    header.kid = Some(kid.to_string());

    encode(&header, claims, key)
        .map_err(|e| AuthError::Crypto(format!("JWT signing operation failed: {}", e)))
}

/// Validation rules applied to every candidate key.
///
/// `exp` has no leeway so a token stops being accepted exactly when its
/// revocation entry (sized to the remaining lifetime) disappears.
pub fn verification_rules(issuer: &str, audience: &str) -> Validation {
    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
    validation
}

/// Result of checking a token against a single candidate key.
#[derive(Debug)]
pub enum SignatureCheck {
    /// Signature verified and registered claims passed.
    Verified(TokenClaims),
    /// Signature verified but the token is past `exp`.
    Expired,
    /// Signature did not verify under this key.
    Mismatch,
    /// Signature verified (or could not be reached) but the token is unusable.
    Rejected,
}

/// Check `token` against one public key.
///
/// The header and payload must already have been decoded successfully by the
/// caller, so a base64 failure here can only come from the signature segment.
pub fn verify_with_key(token: &str, key: &DecodingKey, validation: &Validation) -> SignatureCheck {
    match decode::<TokenClaims>(token, key, validation) {
        Ok(data) => SignatureCheck::Verified(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => SignatureCheck::Expired,
            ErrorKind::InvalidSignature | ErrorKind::Base64(_) => SignatureCheck::Mismatch,
            _ => {
                tracing::debug!(target: "auth.crypto", error = %e, "Token rejected after signature check");
                SignatureCheck::Rejected
            }
        },
    }
}

/// Generate a unique token id for the `jti` claim.
pub fn generate_token_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Stable identity of a token for revocation bookkeeping (hex SHA-256).
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
