//! Integration tests for health probes and the metrics endpoint

use auth_service::cache::InMemoryCache;
use auth_service::keys::{KeyConfig, KeyStore};
use auth_test_utils::{test_config, test_key_entry, TestAuthServer, TEST_KEY_ID_1};
use reqwest::StatusCode;
use std::sync::Arc;

// ============================================================================
// Liveness Probe Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");
    Ok(())
}

// ============================================================================
// Readiness Probe Tests
// ============================================================================

#[tokio::test]
async fn test_ready_endpoint_returns_ok_with_signing_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["signing_key"], "available");
    assert!(body.get("error").is_none());
    Ok(())
}

#[tokio::test]
async fn test_ready_endpoint_returns_503_without_private_key() -> Result<(), anyhow::Error> {
    let keys = KeyStore::verification_only(KeyConfig {
        active_kid: TEST_KEY_ID_1.to_string(),
        entries: vec![test_key_entry(TEST_KEY_ID_1, 1, false)],
    })?;
    let server = TestAuthServer::spawn_with(
        Arc::new(keys),
        Arc::new(InMemoryCache::new()),
        test_config(),
    )
    .await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["signing_key"], "unavailable");

    // Internal details stay in the logs
    let error = body["error"].as_str().unwrap_or_default();
    assert!(!error.contains(TEST_KEY_ID_1), "Error leaked key id: {error}");
    Ok(())
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_404() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/api/v1/nope", server.url())).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
