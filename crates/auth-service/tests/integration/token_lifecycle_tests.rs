//! Integration tests for issuing and verifying tokens
//!
//! These exercise the issuer and verifier together over the fixture keys,
//! including tokens crafted to fail each verification step.

use auth_service::errors::TokenError;
use auth_service::models::{Role, TokenUse};
use auth_service::services::token_issuer::{ACCESS_TOKEN_TTL_SECONDS, REFRESH_TOKEN_TTL_SECONDS};
use auth_service::services::{TokenIssuer, TokenSubject, TokenVerifier};
use auth_test_utils::{
    test_key_store, TestClaimsBuilder, TokenAssertions, TEST_DEVICE_TABLET, TEST_KEY_ID_1,
    TEST_KEY_ID_2, TEST_USER_ALICE, TEST_ZONE_NORTH,
};
use chrono::Utc;
use std::time::Duration;

const CLOCK_SKEW: Duration = Duration::from_secs(300);

fn issuer_and_verifier() -> (TokenIssuer, TokenVerifier) {
    let keys = test_key_store(TEST_KEY_ID_1);
    (
        TokenIssuer::new(keys.clone()),
        TokenVerifier::new(keys, CLOCK_SKEW),
    )
}

fn alice() -> TokenSubject {
    TokenSubject {
        device_id: Some(TEST_DEVICE_TABLET.to_string()),
        email: Some("alice@example.com".to_string()),
        ..TokenSubject::new(TEST_USER_ALICE, Role::Caregiver, TEST_ZONE_NORTH)
    }
}

// ============================================================================
// Issuance
// ============================================================================

#[tokio::test]
async fn test_issued_pair_round_trips_through_verifier() -> Result<(), anyhow::Error> {
    let (issuer, verifier) = issuer_and_verifier();

    let pair = issuer.issue_token_pair(&alice())?;

    pair.access
        .token
        .assert_valid_jwt()
        .assert_signed_by(TEST_KEY_ID_1)
        .assert_for_subject(TEST_USER_ALICE)
        .assert_role(Role::Caregiver)
        .assert_token_use(TokenUse::Access)
        .assert_expires_in(ACCESS_TOKEN_TTL_SECONDS, 5);

    pair.refresh
        .token
        .assert_valid_jwt()
        .assert_token_use(TokenUse::Refresh)
        .assert_expires_in(REFRESH_TOKEN_TTL_SECONDS, 5);

    let claims = verifier.verify_access(&pair.access.token)?;
    assert_eq!(claims.sub, TEST_USER_ALICE);
    assert_eq!(claims.zone_id, TEST_ZONE_NORTH);
    assert_eq!(claims.device_id, TEST_DEVICE_TABLET);
    assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
    assert_eq!(claims.jti, pair.access.jti);

    let refresh_claims = verifier.verify_refresh(&pair.refresh.token)?;
    assert_eq!(refresh_claims.jti, pair.refresh.jti);
    assert_ne!(pair.access.jti, pair.refresh.jti);

    Ok(())
}

#[tokio::test]
async fn test_refresh_token_keeps_caller_supplied_id() -> Result<(), anyhow::Error> {
    let (issuer, verifier) = issuer_and_verifier();

    let token = issuer.issue_refresh_token(&alice(), Some("stored-refresh-42"))?;
    assert_eq!(token.jti, "stored-refresh-42");
    assert_eq!(verifier.verify_refresh(&token.token)?.jti, "stored-refresh-42");

    let generated = issuer.issue_refresh_token(&alice(), Some("   "))?;
    assert_ne!(generated.jti.trim(), "");

    Ok(())
}

// ============================================================================
// Token use separation
// ============================================================================

#[tokio::test]
async fn test_token_uses_are_not_interchangeable() -> Result<(), anyhow::Error> {
    let (issuer, verifier) = issuer_and_verifier();
    let pair = issuer.issue_token_pair(&alice())?;

    assert_eq!(
        verifier.verify_access(&pair.refresh.token),
        Err(TokenError::Malformed),
        "Refresh token must not authenticate as an access token"
    );
    assert_eq!(
        verifier.verify_refresh(&pair.access.token),
        Err(TokenError::Malformed),
        "Access token must not be redeemable as a refresh token"
    );

    // Use-agnostic verification accepts both
    assert!(verifier.verify(&pair.access.token).is_ok());
    assert!(verifier.verify(&pair.refresh.token).is_ok());

    Ok(())
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_expired_token_is_rejected_without_leeway() {
    let (_, verifier) = issuer_and_verifier();

    let token = TestClaimsBuilder::new()
        .issued_at(Utc::now().timestamp() - 7200)
        .expires_in(-1)
        .sign(1, TEST_KEY_ID_1);

    assert_eq!(verifier.verify_access(&token), Err(TokenError::Expired));
}

#[tokio::test]
async fn test_unknown_kid_is_rejected() {
    let (_, verifier) = issuer_and_verifier();

    let token = TestClaimsBuilder::new().sign(1, "never-published");

    assert_eq!(verifier.verify_access(&token), Err(TokenError::UnknownKey));
}

#[tokio::test]
async fn test_foreign_key_under_known_kid_is_rejected() {
    let (_, verifier) = issuer_and_verifier();

    // Pair 2 signs, but the header claims the published key
    let token = TestClaimsBuilder::new().sign(2, TEST_KEY_ID_1);

    assert_eq!(
        verifier.verify_access(&token),
        Err(TokenError::InvalidSignature)
    );
}

#[tokio::test]
async fn test_foreign_key_under_its_own_kid_is_unknown() {
    let (_, verifier) = issuer_and_verifier();

    let token = TestClaimsBuilder::new().sign(2, TEST_KEY_ID_2);

    assert_eq!(verifier.verify_access(&token), Err(TokenError::UnknownKey));
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() -> Result<(), anyhow::Error> {
    let (issuer, verifier) = issuer_and_verifier();
    let token = issuer.issue_access_token(&alice())?.token;

    let forged_claims = TestClaimsBuilder::new().with_role(Role::Admin).build();
    let forged_payload = {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims)?)
    };

    let parts: Vec<&str> = token.split('.').collect();
    let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    assert_eq!(
        verifier.verify_access(&tampered),
        Err(TokenError::InvalidSignature)
    );
    Ok(())
}

#[tokio::test]
async fn test_wrong_audience_and_issuer_are_rejected() {
    let (_, verifier) = issuer_and_verifier();

    let wrong_audience = TestClaimsBuilder::new()
        .audience("some-other-api")
        .sign(1, TEST_KEY_ID_1);
    assert_eq!(
        verifier.verify_access(&wrong_audience),
        Err(TokenError::Malformed)
    );

    let wrong_issuer = TestClaimsBuilder::new()
        .issuer("someone-else")
        .sign(1, TEST_KEY_ID_1);
    assert_eq!(
        verifier.verify_access(&wrong_issuer),
        Err(TokenError::Malformed)
    );
}

#[tokio::test]
async fn test_garbage_is_malformed() {
    let (_, verifier) = issuer_and_verifier();

    for garbage in ["", "not-a-jwt", "a.b", "a.b.c", "....."] {
        assert_eq!(
            verifier.verify_access(garbage),
            Err(TokenError::Malformed),
            "{garbage:?} should be malformed"
        );
    }
}

// ============================================================================
// Clock skew
// ============================================================================

#[tokio::test]
async fn test_iat_within_skew_is_accepted() {
    let (_, verifier) = issuer_and_verifier();

    let token = TestClaimsBuilder::new()
        .issued_at(Utc::now().timestamp() + 60)
        .sign(1, TEST_KEY_ID_1);

    assert!(verifier.verify_access(&token).is_ok());
}

#[tokio::test]
async fn test_iat_beyond_skew_is_rejected() {
    let (_, verifier) = issuer_and_verifier();

    let token = TestClaimsBuilder::new()
        .issued_at(Utc::now().timestamp() + 1800)
        .expires_in(7200)
        .sign(1, TEST_KEY_ID_1);

    assert_eq!(verifier.verify_access(&token), Err(TokenError::Malformed));
}
