//! JWT utilities shared by the issuer and verifier.
//!
//! This module provides the pre-verification plumbing for compact JWTs:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Segment splitting and header decoding (to read `kid` and `alg`)
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature. Header and payload decoding
//!   exist for key selection and diagnostics only and must never be used to
//!   authorize a request.
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! // Read the header to pick a verification key
//! let header = decode_header(token)?;
//! let kid = header.kid.as_deref();
//!
//! // After signature verification, validate iat
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// # Rationale
///
/// - An RS256 access token with the full claim set is ~800 bytes
/// - 8KB leaves room for long permission lists while bounding base64 work
///
/// Per OWASP API Security Top 10 - API4:2023 (Unrestricted Resource Consumption)
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected at startup.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before verification.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Header Types
// =============================================================================

/// The subset of the JOSE header the verifier cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm declared by the token (e.g. `RS256`).
    pub alg: String,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,

    /// Key identifier of the signing key, when the issuer set one.
    #[serde(default)]
    pub kid: Option<String>,
}

/// Borrowed view over the three segments of a compact JWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSegments<'a> {
    /// Base64url-encoded header.
    pub header: &'a str,
    /// Base64url-encoded payload.
    pub payload: &'a str,
    /// Base64url-encoded signature.
    pub signature: &'a str,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments.
///
/// The size limit is enforced before the token is scanned.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Token does not have exactly three non-empty segments
pub fn split_token(token: &str) -> Result<TokenSegments<'_>, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok(TokenSegments {
                header,
                payload,
                signature,
            })
        }
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode the JOSE header of a JWT without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
/// - The `kid` value should only be used for key lookup in a trusted key set
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken` (wrong structure, bad base64,
/// invalid JSON, missing `alg`, empty `kid`).
pub fn decode_header(token: &str) -> Result<JwtHeader, JwtValidationError> {
    let segments = split_token(token)?;

    let header_bytes = URL_SAFE_NO_PAD.decode(segments.header).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: JwtHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    // An empty kid is never issued by us; treat it as tampering rather than "absent"
    if header.kid.as_deref() == Some("") {
        tracing::debug!(target: "common.jwt", "Token rejected: empty kid");
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(header)
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// Returns `Ok(None)` when the header is well-formed but carries no `kid`.
///
/// # Errors
///
/// Same as [`decode_header`].
pub fn extract_kid(token: &str) -> Result<Option<String>, JwtValidationError> {
    decode_header(token).map(|header| header.kid)
}

/// Decode the payload of a JWT into untyped JSON without verifying the signature.
///
/// Diagnostics only. The result carries no authenticity guarantee.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken`.
pub fn decode_payload_unverified(token: &str) -> Result<serde_json::Value, JwtValidationError> {
    let segments = split_token(token)?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(segments.payload).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtValidationError::MalformedToken
    })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` too far in the future, which could indicate
/// token pre-generation, clock drift, or manipulation.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
