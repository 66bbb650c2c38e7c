use crate::crypto::{self, sign_token};
use crate::errors::AuthError;
use crate::keys::{KeyStore, KeyStoreError};
use crate::models::{Role, TokenClaims, TokenUse, UNKNOWN_DEVICE_ID};
use crate::observability::metrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600; // 1 hour
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600; // 30 days

/// `iss` claim on every token this service signs.
pub const TOKEN_ISSUER: &str = "care-platform-auth";
/// `aud` claim on every token this service signs.
pub const TOKEN_AUDIENCE: &str = "care-platform-api";

/// Who a token is issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: String,
    pub role: Role,
    pub zone_id: String,
    pub device_id: Option<String>,
    pub email: Option<String>,
    pub permissions: Option<Vec<String>>,
}

impl TokenSubject {
    pub fn new(user_id: impl Into<String>, role: Role, zone_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            zone_id: zone_id.into(),
            device_id: None,
            email: None,
            permissions: None,
        }
    }
}

impl From<&TokenClaims> for TokenSubject {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            role: claims.role,
            zone_id: claims.zone_id.clone(),
            device_id: Some(claims.device_id.clone()),
            email: claims.email.clone(),
            permissions: claims.permissions.clone(),
        }
    }
}

/// A signed token plus the bookkeeping callers usually need to persist.
#[derive(Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub kid: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl IssuedToken {
    /// SHA-256 hex digest of the compact token, for storing instead of the token.
    pub fn token_hash(&self) -> String {
        crypto::token_hash(&self.token)
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.expires_at - self.issued_at
    }
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("jti", &self.jti)
            .field("kid", &self.kid)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Signs access and refresh tokens with the store's active key.
pub struct TokenIssuer {
    keys: Arc<KeyStore>,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    /// Confirm the active key can sign. Returns the active `kid`.
    ///
    /// Called at startup and by the readiness probe so a missing private key
    /// surfaces before any request needs it.
    pub fn check_ready(&self) -> Result<String, KeyStoreError> {
        self.keys.signing_key().map(|key| key.kid.clone())
    }

    /// One hour RS256 access token with a fresh `jti`.
    #[instrument(skip_all, fields(role = %subject.role))]
    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<IssuedToken, AuthError> {
        self.issue(
            subject,
            TokenUse::Access,
            crypto::generate_token_id(),
            Utc::now().timestamp(),
        )
    }

    /// Thirty day RS256 refresh token.
    ///
    /// `token_id` lets the caller correlate the token with externally stored
    /// refresh-token bookkeeping; a fresh id is generated when it is absent or
    /// empty.
    #[instrument(skip_all, fields(role = %subject.role))]
    pub fn issue_refresh_token(
        &self,
        subject: &TokenSubject,
        token_id: Option<&str>,
    ) -> Result<IssuedToken, AuthError> {
        let jti = token_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(crypto::generate_token_id, str::to_string);
        self.issue(subject, TokenUse::Refresh, jti, Utc::now().timestamp())
    }

    /// Access and refresh token sharing one issuance instant.
    #[instrument(skip_all, fields(role = %subject.role))]
    pub fn issue_token_pair(&self, subject: &TokenSubject) -> Result<TokenPair, AuthError> {
        let now = Utc::now().timestamp();
        let access = self.issue(subject, TokenUse::Access, crypto::generate_token_id(), now)?;
        let refresh = self.issue(subject, TokenUse::Refresh, crypto::generate_token_id(), now)?;
        Ok(TokenPair { access, refresh })
    }

    fn issue(
        &self,
        subject: &TokenSubject,
        token_use: TokenUse,
        jti: String,
        now: i64,
    ) -> Result<IssuedToken, AuthError> {
        let start = Instant::now();
        let result = self.sign(subject, token_use, jti, now);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_token_issuance(token_use.as_str(), status, start.elapsed());
        if let Err(e) = &result {
            tracing::error!(target: "auth.issuer", token_use = token_use.as_str(), error = %e, "Token issuance failed");
        }
        result
    }

    fn sign(
        &self,
        subject: &TokenSubject,
        token_use: TokenUse,
        jti: String,
        now: i64,
    ) -> Result<IssuedToken, AuthError> {
        let signing_key = self.keys.signing_key()?;

        let ttl = match token_use {
            TokenUse::Access => ACCESS_TOKEN_TTL_SECONDS,
            TokenUse::Refresh => REFRESH_TOKEN_TTL_SECONDS,
        };

        let claims = TokenClaims {
            sub: subject.user_id.clone(),
            role: subject.role,
            zone_id: subject.zone_id.clone(),
            device_id: subject
                .device_id
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_DEVICE_ID.to_string()),
            email: subject.email.clone(),
            permissions: subject.permissions.clone(),
            jti,
            iat: now,
            exp: now + ttl,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            token_use,
        };

        let token = sign_token(&claims, &signing_key.key, &signing_key.kid)?;

        tracing::debug!(
            target: "auth.issuer",
            token_use = token_use.as_str(),
            kid = %signing_key.kid,
            jti = %claims.jti,
            "Token issued"
        );

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            kid: signing_key.kid.clone(),
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
