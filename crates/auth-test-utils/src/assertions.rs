//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions over issued tokens. Assertions decode the
//! token without checking the signature; use the verifier for that.

use auth_service::models::{Role, TokenClaims, TokenUse};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// JWT header structure
#[derive(Debug, Deserialize)]
struct JwtHeader {
    pub alg: String,
    pub typ: String,
    #[serde(default)]
    pub kid: Option<String>,
}

fn segment(token: &str, index: usize) -> Vec<u8> {
    let parts: Vec<_> = token.split('.').collect();
    assert_eq!(
        parts.len(),
        3,
        "JWT must have 3 parts (header.payload.signature), got {}",
        parts.len()
    );
    URL_SAFE_NO_PAD
        .decode(parts[index])
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT segment {index}: {e}"))
}

fn header(token: &str) -> JwtHeader {
    serde_json::from_slice(&segment(token, 0)).expect("Failed to parse JWT header")
}

fn claims(token: &str) -> TokenClaims {
    serde_json::from_slice(&segment(token, 1)).expect("Failed to parse JWT claims")
}

/// Custom assertions for issued tokens
///
/// # Example
/// ```rust,ignore
/// pair.access.token
///     .assert_valid_jwt()
///     .assert_token_use(TokenUse::Access)
///     .assert_signed_by("test-key-2025-01");
/// ```
pub trait TokenAssertions {
    /// Assert RS256, typ JWT and a payload that parses as token claims
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert the header `kid`
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    fn assert_for_subject(&self, subject: &str) -> &Self;

    fn assert_role(&self, role: Role) -> &Self;

    fn assert_token_use(&self, token_use: TokenUse) -> &Self;

    /// Assert `exp - iat` equals `seconds`, and that `exp` is within
    /// `tolerance` seconds of now plus `seconds`
    fn assert_expires_in(&self, seconds: i64, tolerance: i64) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        let header = header(self);
        assert_eq!(header.alg, "RS256", "Expected RS256 algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");
        assert!(header.kid.is_some(), "Expected a kid in the header");

        let _ = claims(self);
        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header = header(self);
        assert_eq!(
            header.kid.as_deref(),
            Some(key_id),
            "Expected key_id '{}', got {:?}",
            key_id,
            header.kid
        );
        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims.sub, subject,
            "Expected subject '{}', got '{}'",
            subject, claims.sub
        );
        self
    }

    fn assert_role(&self, role: Role) -> &Self {
        let claims = claims(self);
        assert_eq!(claims.role, role, "Expected role {role}, got {}", claims.role);
        self
    }

    fn assert_token_use(&self, token_use: TokenUse) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims.token_use, token_use,
            "Expected token_use {:?}, got {:?}",
            token_use, claims.token_use
        );
        self
    }

    fn assert_expires_in(&self, seconds: i64, tolerance: i64) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims.exp - claims.iat,
            seconds,
            "Expected lifetime of {}s, got {}s",
            seconds,
            claims.exp - claims.iat
        );

        let expires_in = claims.exp - chrono::Utc::now().timestamp();
        assert!(
            (expires_in - seconds).abs() <= tolerance,
            "Token expires in {}s, expected {}s (±{}s)",
            expires_in,
            seconds,
            tolerance
        );
        self
    }
}
