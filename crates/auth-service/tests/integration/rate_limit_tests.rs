//! Integration tests for per-client rate limiting over HTTP

use auth_service::cache::InMemoryCache;
use auth_service::models::Role;
use auth_test_utils::{
    test_config_with, test_key_store, TestAuthServer, TEST_CLIENT_IP_1, TEST_CLIENT_IP_2,
    TEST_KEY_ID_1, TEST_USER_ALICE,
};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

async fn spawn_with_limits(vars: &[(&str, &str)]) -> Result<TestAuthServer, anyhow::Error> {
    TestAuthServer::spawn_with(
        test_key_store(TEST_KEY_ID_1),
        Arc::new(InMemoryCache::new()),
        test_config_with(vars),
    )
    .await
}

#[tokio::test]
async fn test_refresh_limit_returns_429_with_retry_after() -> Result<(), anyhow::Error> {
    let server = spawn_with_limits(&[
        ("RATE_LIMIT_REFRESH_MAX", "2"),
        ("RATE_LIMIT_REFRESH_WINDOW_SECS", "600"),
    ])
    .await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/auth/refresh", server.url());

    // Failed attempts count too
    for _ in 0..2 {
        let response = client
            .post(&url)
            .json(&json!({ "refreshToken": "guess" }))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let pair = server.issue_tokens(TEST_USER_ALICE, Role::Caregiver)?;
    let response = client
        .post(&url)
        .json(&json!({ "refreshToken": pair.refresh.token }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("429 carries a numeric Retry-After");
    assert!((1..=600).contains(&retry_after), "retry_after = {retry_after}");

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");

    // A limited refresh must not have consumed the token
    assert!(!server.state().revocation.is_revoked(&pair.refresh.token).await);
    Ok(())
}

#[tokio::test]
async fn test_general_limit_covers_api_but_not_probes() -> Result<(), anyhow::Error> {
    let server = spawn_with_limits(&[("RATE_LIMIT_GENERAL_MAX", "3")]).await?;
    let client = reqwest::Client::new();
    let pair = server.issue_tokens(TEST_USER_ALICE, Role::Caregiver)?;

    for _ in 0..3 {
        let response = client
            .get(format!("{}/api/v1/auth/me", server.url()))
            .bearer_auth(&pair.access.token)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let limited = client
        .get(format!("{}/api/v1/auth/me", server.url()))
        .bearer_auth(&pair.access.token)
        .send()
        .await?;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    let health = client.get(format!("{}/health", server.url())).send().await?;
    assert_eq!(health.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_forwarded_for_ignored_unless_trusted() -> Result<(), anyhow::Error> {
    let server = spawn_with_limits(&[("RATE_LIMIT_GENERAL_MAX", "2")]).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/auth/me", server.url());

    let mut statuses = Vec::new();
    for ip in [TEST_CLIENT_IP_1, TEST_CLIENT_IP_2, "198.51.100.7"] {
        let response = client.get(&url).header("X-Forwarded-For", ip).send().await?;
        statuses.push(response.status());
    }

    // All three share the peer address, so the third is limited
    assert_eq!(
        statuses,
        vec![
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_trusted_forwarded_for_separates_clients() -> Result<(), anyhow::Error> {
    let server = spawn_with_limits(&[
        ("RATE_LIMIT_GENERAL_MAX", "1"),
        ("TRUST_FORWARDED_FOR", "true"),
    ])
    .await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/auth/me", server.url());

    let first = client
        .get(&url)
        .header("X-Forwarded-For", TEST_CLIENT_IP_1)
        .send()
        .await?;
    let second = client
        .get(&url)
        .header("X-Forwarded-For", format!("{TEST_CLIENT_IP_2}, 10.0.0.1"))
        .send()
        .await?;
    let repeat = client
        .get(&url)
        .header("X-Forwarded-For", TEST_CLIENT_IP_1)
        .send()
        .await?;

    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}
