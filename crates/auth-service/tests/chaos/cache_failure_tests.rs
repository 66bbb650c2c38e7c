//! Chaos tests for shared cache outages
//!
//! With the cache down, revocation checks must fail closed (tokens are
//! treated as revoked) while rate limiting fails open (requests pass).

use auth_service::cache::SharedCache;
use auth_service::errors::{AuthError, TokenError};
use auth_service::models::Role;
use auth_service::services::{
    RateLimitDecision, RateLimitPolicies, RateLimitPolicy, RateLimitScope, RateLimiter,
    RevocationStore,
};
use auth_test_utils::{
    test_config, test_key_store, FailingCache, TestAuthServer, TEST_CLIENT_IP_1, TEST_KEY_ID_1,
    TEST_USER_ALICE,
};
use axum::response::IntoResponse;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_with_cache_down() -> Result<TestAuthServer, anyhow::Error> {
    TestAuthServer::spawn_with(
        test_key_store(TEST_KEY_ID_1),
        Arc::new(FailingCache),
        test_config(),
    )
    .await
}

#[tokio::test]
async fn test_valid_token_rejected_while_cache_down() -> Result<(), anyhow::Error> {
    let server = spawn_with_cache_down().await?;
    let pair = server.issue_tokens(TEST_USER_ALICE, Role::Caregiver)?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/auth/me", server.url()))
        .bearer_auth(&pair.access.token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        server.state().authenticator.authenticate(&pair.access.token).await,
        Err(TokenError::Revoked)
    );
    Ok(())
}

#[tokio::test]
async fn test_refresh_fails_closed_while_cache_down() -> Result<(), anyhow::Error> {
    let server = spawn_with_cache_down().await?;
    let pair = server.issue_tokens(TEST_USER_ALICE, Role::Caregiver)?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/refresh", server.url()))
        .json(&json!({ "refreshToken": pair.refresh.token }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_probes_unaffected_by_cache_outage() -> Result<(), anyhow::Error> {
    let server = spawn_with_cache_down().await?;

    let health = reqwest::get(format!("{}/health", server.url())).await?;
    let ready = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(ready.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_revoke_failure_surfaces_as_503() {
    let store = RevocationStore::new(Arc::new(FailingCache) as Arc<dyn SharedCache>);

    let err = store
        .revoke("some-token", Duration::from_secs(60))
        .await
        .expect_err("revoke must report the outage");

    let response = AuthError::from(err).into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_rate_limiter_fails_open() {
    let policies = RateLimitPolicies {
        login: RateLimitPolicy::new(1, Duration::from_secs(60)),
        ..RateLimitPolicies::default()
    };
    let limiter = RateLimiter::new(Arc::new(FailingCache), policies);

    for _ in 0..5 {
        let decision = limiter.check(TEST_CLIENT_IP_1, RateLimitScope::Login).await;
        assert!(
            matches!(decision, RateLimitDecision::Allowed { .. }),
            "Cache outage must not lock clients out"
        );
    }
}
