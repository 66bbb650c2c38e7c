//! Integration tests for bearer authentication and role checks over HTTP

use auth_service::models::{CurrentUserResponse, Role, TokenUse};
use auth_test_utils::{
    TestAuthServer, TestClaimsBuilder, TEST_KEY_ID_1, TEST_USER_ADMIN, TEST_USER_ALICE,
    TEST_USER_BOB,
};
use reqwest::StatusCode;
use serde_json::json;

async fn get_me(server: &TestAuthServer, authorization: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("{}/api/v1/auth/me", server.url()));
    if let Some(value) = authorization {
        request = request.header("Authorization", value);
    }
    request.send().await.expect("request reaches test server")
}

async fn error_code(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.expect("error body is JSON");
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

// ============================================================================
// Bearer extraction
// ============================================================================

#[tokio::test]
async fn test_missing_authorization_is_401() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = get_me(&server, None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_TOKEN");
    Ok(())
}

#[tokio::test]
async fn test_non_bearer_schemes_are_401() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    for value in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer ", "token abc"] {
        let response = get_me(&server, Some(value)).await;
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{value:?} should be rejected"
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_all_token_failures_look_the_same() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let expired = TestClaimsBuilder::new()
        .issued_at(chrono::Utc::now().timestamp() - 7200)
        .expires_in(-60)
        .sign(1, TEST_KEY_ID_1);
    let unknown_key = TestClaimsBuilder::new().sign(2, "retired-long-ago");
    let forged = TestClaimsBuilder::new().sign(3, TEST_KEY_ID_1);

    let mut bodies = Vec::new();
    for token in [expired, unknown_key, forged, "garbage".to_string()] {
        let response = get_me(&server, Some(&format!("Bearer {token}"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(response.text().await?);
    }

    assert!(
        bodies.windows(2).all(|pair| pair[0] == pair[1]),
        "Rejection bodies must not reveal the failure reason: {bodies:?}"
    );
    Ok(())
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_me_returns_caller_identity() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let pair = server.issue_tokens(TEST_USER_ALICE, Role::Caregiver)?;

    let response = get_me(&server, Some(&format!("Bearer {}", pair.access.token))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let me: CurrentUserResponse = response.json().await?;
    assert_eq!(me.user_id, TEST_USER_ALICE);
    assert_eq!(me.role, Role::Caregiver);
    assert_eq!(me.expires_at, pair.access.expires_at);
    assert!(me.permissions.contains(&"visits:check_in".to_string()));
    assert!(!me.permissions.contains(&"visits:assign".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_me_prefers_explicit_permissions() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = TestClaimsBuilder::new()
        .for_user(TEST_USER_BOB)
        .with_role(Role::Family)
        .with_permissions(&["visits:read"])
        .sign(1, TEST_KEY_ID_1);

    let response = get_me(&server, Some(&format!("Bearer {token}"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let me: CurrentUserResponse = response.json().await?;
    assert_eq!(me.permissions, vec!["visits:read".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_refresh_token_cannot_call_api() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let refresh = TestClaimsBuilder::new()
        .token_use(TokenUse::Refresh)
        .sign(1, TEST_KEY_ID_1);

    let response = get_me(&server, Some(&format!("Bearer {refresh}"))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

// ============================================================================
// Role checks
// ============================================================================

#[tokio::test]
async fn test_admin_route_rejects_other_roles() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/admin/tokens/revoke", server.url());

    for role in [Role::Coordinator, Role::Caregiver, Role::Family] {
        let pair = server.issue_tokens(TEST_USER_ALICE, role)?;
        let response = client
            .post(&url)
            .bearer_auth(&pair.access.token)
            .json(&json!({ "token": pair.refresh.token }))
            .send()
            .await?;

        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{role} allowed");
        assert_eq!(error_code(response).await, "INSUFFICIENT_ROLE");
    }
    Ok(())
}

#[tokio::test]
async fn test_admin_route_requires_authentication_first() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/admin/tokens/revoke", server.url()))
        .json(&json!({ "token": "whatever" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_admin_can_reach_admin_route() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let admin = server.issue_tokens(TEST_USER_ADMIN, Role::Admin)?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/admin/tokens/revoke", server.url()))
        .bearer_auth(&admin.access.token)
        .json(&json!({ "token": "not-a-token" }))
        .send()
        .await?;

    // Authorized, but the body names nothing revocable
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
