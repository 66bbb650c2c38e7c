//! Signature and claim verification against the current key set.
//!
//! Per call:
//! 1. Decode header and payload without verifying. Anything unparseable, or
//!    any algorithm other than RS256, is `Malformed`.
//! 2. A header `kid` the store does not know is `UnknownKey`.
//! 3. Try candidate keys in store order. The first key whose signature
//!    verifies decides the result: `Expired` is returned immediately, claim
//!    failures are `Malformed`.
//! 4. If no candidate verifies, `InvalidSignature`.
//! 5. `iat` more than the clock-skew tolerance in the future is `Malformed`.

use super::token_issuer::{TOKEN_AUDIENCE, TOKEN_ISSUER};
use crate::crypto::{self, SignatureCheck, SIGNING_ALGORITHM_NAME};
use crate::errors::TokenError;
use crate::keys::KeyStore;
use crate::models::{TokenClaims, TokenUse};
use crate::observability::{metrics, ErrorCategory};
use common::jwt::{self, JwtValidationError};
use jsonwebtoken::Validation;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct TokenVerifier {
    keys: Arc<KeyStore>,
    clock_skew: Duration,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyStore>, clock_skew: Duration) -> Self {
        Self {
            keys,
            clock_skew,
            validation: crypto::verification_rules(TOKEN_ISSUER, TOKEN_AUDIENCE),
        }
    }

    /// Verify a token of either use.
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let result = self.verify_inner(token);
        record_outcome(&result);
        result
    }

    /// Verify a token that must be an access token.
    #[instrument(skip_all)]
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_use(token, TokenUse::Access)
    }

    /// Verify a token that must be a refresh token.
    #[instrument(skip_all)]
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_use(token, TokenUse::Refresh)
    }

    fn verify_use(&self, token: &str, expected: TokenUse) -> Result<TokenClaims, TokenError> {
        let result = self.verify_inner(token).and_then(|claims| {
            if claims.token_use == expected {
                Ok(claims)
            } else {
                tracing::debug!(
                    target: "auth.verifier",
                    expected = expected.as_str(),
                    actual = claims.token_use.as_str(),
                    "Token use mismatch"
                );
                Err(TokenError::Malformed)
            }
        });
        record_outcome(&result);
        result
    }

    fn verify_inner(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let header = jwt::decode_header(token).map_err(malformed)?;
        if header.alg != SIGNING_ALGORITHM_NAME {
            tracing::debug!(target: "auth.verifier", alg = %header.alg, "Unsupported algorithm");
            return Err(TokenError::Malformed);
        }

        // Payload must decode before any signature work, so a base64 failure
        // during signature checks can only come from the signature segment.
        jwt::decode_payload_unverified(token).map_err(malformed)?;

        let candidates = self
            .keys
            .verification_candidates(header.kid.as_deref())
            .map_err(|_| {
                tracing::debug!(target: "auth.verifier", kid = ?header.kid, "Token kid not in key set");
                TokenError::UnknownKey
            })?;

        let mut verified = None;
        for candidate in &candidates {
            match crypto::verify_with_key(token, &candidate.key, &self.validation) {
                SignatureCheck::Verified(claims) => {
                    tracing::debug!(target: "auth.verifier", kid = %candidate.kid, "Signature verified");
                    verified = Some(claims);
                    break;
                }
                SignatureCheck::Expired => return Err(TokenError::Expired),
                SignatureCheck::Rejected => return Err(TokenError::Malformed),
                SignatureCheck::Mismatch => continue,
            }
        }

        let claims = verified.ok_or(TokenError::InvalidSignature)?;

        jwt::validate_iat(claims.iat, self.clock_skew).map_err(malformed)?;

        Ok(claims)
    }

    /// Decode claims without checking the signature.
    ///
    /// Diagnostics only. The result must never be used to authorize anything.
    pub fn decode_unverified(token: &str) -> Result<serde_json::Value, TokenError> {
        jwt::decode_payload_unverified(token).map_err(malformed)
    }
}

fn malformed(err: JwtValidationError) -> TokenError {
    tracing::debug!(target: "auth.verifier", error = %err, "Token malformed");
    TokenError::Malformed
}

fn record_outcome(result: &Result<TokenClaims, TokenError>) {
    match result {
        Ok(_) => metrics::record_token_validation("success", None),
        Err(e) => {
            tracing::debug!(
                target: "auth.verifier",
                reason = e.as_str(),
                category = ErrorCategory::from(e).as_str(),
                "Token verification failed"
            );
            metrics::record_token_validation("error", Some(e.as_str()));
        }
    }
}
