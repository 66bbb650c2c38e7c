//! Observability helpers.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]` and add fields
//! explicitly. Fields fall into three groups:
//! - **SAFE**: logged as-is (roles, kids, scopes, outcome labels)
//! - **HASHED**: logged only through [`hash_for_correlation`] (user ids,
//!   client addresses)
//! - **NEVER**: tokens, key material, secret-store credentials

pub mod metrics;

use crate::errors::TokenError;
use sha2::{Digest, Sha256};

/// Hash a value for log correlation (SHA-256, first 8 hex chars).
///
/// This is a one-way correlation id, not a secret-safe digest: short inputs
/// from a small space can be brute forced.
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}

/// Coarse failure classes for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Token past its lifetime or revoked.
    Lifecycle,
    /// Signature or key selection failed.
    Cryptographic,
    /// Token could not be parsed or failed claim checks.
    Format,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Lifecycle => "lifecycle",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Format => "format",
        }
    }
}

impl From<&TokenError> for ErrorCategory {
    fn from(err: &TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Revoked => ErrorCategory::Lifecycle,
            TokenError::InvalidSignature | TokenError::UnknownKey => ErrorCategory::Cryptographic,
            TokenError::Malformed => ErrorCategory::Format,
        }
    }
}
