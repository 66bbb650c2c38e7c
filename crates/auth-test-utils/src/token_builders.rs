//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating claims and signing them with the
//! fixture keys, including tokens the service would never issue itself
//! (expired, wrong audience, refresh used as access).

use crate::crypto_fixtures::test_key_pair;
use crate::test_ids::TEST_USER_ALICE;
use auth_service::models::{Role, TokenClaims, TokenUse, UNKNOWN_DEVICE_ID};
use auth_service::services::token_issuer::{TOKEN_AUDIENCE, TOKEN_ISSUER};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use uuid::Uuid;

/// Builder for test token claims
///
/// # Example
/// ```rust,ignore
/// let token = TestClaimsBuilder::new()
///     .for_user("alice")
///     .with_role(Role::Coordinator)
///     .expires_in(-60)
///     .sign(1, TEST_KEY_ID_1);
/// ```
pub struct TestClaimsBuilder {
    claims: TokenClaims,
}

impl TestClaimsBuilder {
    /// Create a caregiver access token for [`TEST_USER_ALICE`], valid for an
    /// hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            claims: TokenClaims {
                sub: TEST_USER_ALICE.to_string(),
                role: Role::Caregiver,
                zone_id: crate::test_ids::TEST_ZONE_NORTH.to_string(),
                device_id: UNKNOWN_DEVICE_ID.to_string(),
                email: None,
                permissions: None,
                jti: Uuid::new_v4().to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::seconds(3600)).timestamp(),
                iss: TOKEN_ISSUER.to_string(),
                aud: TOKEN_AUDIENCE.to_string(),
                token_use: TokenUse::Access,
            },
        }
    }

    pub fn for_user(mut self, subject: &str) -> Self {
        self.claims.sub = subject.to_string();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.claims.role = role;
        self
    }

    pub fn in_zone(mut self, zone_id: &str) -> Self {
        self.claims.zone_id = zone_id.to_string();
        self
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.claims.device_id = device_id.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.claims.email = Some(email.to_string());
        self
    }

    /// Set an explicit permission list, overriding the role defaults
    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.claims.permissions = Some(permissions.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn token_use(mut self, token_use: TokenUse) -> Self {
        self.claims.token_use = token_use;
        self
    }

    pub fn with_jti(mut self, jti: &str) -> Self {
        self.claims.jti = jti.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.claims.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.claims.iat = timestamp;
        self
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.claims.iss = issuer.to_string();
        self
    }

    pub fn audience(mut self, audience: &str) -> Self {
        self.claims.aud = audience.to_string();
        self
    }

    pub fn build(self) -> TokenClaims {
        self.claims
    }

    /// Sign with fixture pair `key_index`, putting `kid` in the header.
    pub fn sign(self, key_index: u8, kid: &str) -> String {
        let (private_pem, _) = test_key_pair(key_index);
        let key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .expect("fixture private key parses");
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, &self.claims, &key).expect("fixture claims encode")
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
