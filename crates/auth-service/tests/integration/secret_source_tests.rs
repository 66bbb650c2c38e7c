//! Integration tests for loading keys from the HTTP secret source
//!
//! A mock secret store stands in for the platform secret service.

use auth_service::keys::{
    HttpSecretSource, KeyLoader, KeySourceKind, KeySourceSettings, KeyStoreError, SecretLookup,
    SecretSource, SecretSourceError,
};
use auth_test_utils::{
    test_key_env_vars, KeySetJsonBuilder, TEST_KEY_ID_1, TEST_KEY_ID_2, TEST_SECRET_ID,
    TEST_SECRET_SOURCE_TOKEN,
};
use common::secret::SecretString;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRETS_PATH: &str = "/v1/secrets";

fn secret_path() -> String {
    format!("{SECRETS_PATH}/{TEST_SECRET_ID}")
}

fn http_source(server: &MockServer) -> HttpSecretSource {
    HttpSecretSource::new(
        format!("{}{SECRETS_PATH}/", server.uri()),
        Some(SecretString::from(TEST_SECRET_SOURCE_TOKEN.to_string())),
    )
}

fn loader(lookup: SecretLookup, source: HttpSecretSource) -> KeyLoader {
    KeyLoader::new(
        KeySourceSettings {
            secret_lookup: lookup,
            ..KeySourceSettings::default()
        },
        Some(Arc::new(source) as Arc<dyn SecretSource>),
    )
}

// ============================================================================
// HTTP secret source
// ============================================================================

#[tokio::test]
async fn test_fetch_raw_document_with_bearer_token() {
    let mock_server = MockServer::start().await;
    let document = KeySetJsonBuilder::new(TEST_KEY_ID_1, 1).build();

    Mock::given(method("GET"))
        .and(path(secret_path()))
        .and(header(
            "authorization",
            format!("Bearer {TEST_SECRET_SOURCE_TOKEN}").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(document.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetched = http_source(&mock_server).fetch_secret(TEST_SECRET_ID).await;

    assert_eq!(fetched, Ok(document));
}

#[tokio::test]
async fn test_fetch_unwraps_envelope() {
    let mock_server = MockServer::start().await;
    let document = KeySetJsonBuilder::new(TEST_KEY_ID_1, 1).build();

    Mock::given(method("GET"))
        .and(path(secret_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "secretString": document })),
        )
        .mount(&mock_server)
        .await;

    let fetched = http_source(&mock_server).fetch_secret(TEST_SECRET_ID).await;

    assert_eq!(fetched, Ok(document));
}

#[tokio::test]
async fn test_fetch_maps_error_statuses() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{SECRETS_PATH}/missing")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SECRETS_PATH}/broken")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SECRETS_PATH}/empty")))
        .respond_with(ResponseTemplate::new(200).set_body_string("  "))
        .mount(&mock_server)
        .await;

    let source = http_source(&mock_server);

    assert_eq!(
        source.fetch_secret("missing").await,
        Err(SecretSourceError::NotFound("missing".to_string()))
    );
    assert_eq!(
        source.fetch_secret("broken").await,
        Err(SecretSourceError::Status(500))
    );
    assert!(matches!(
        source.fetch_secret("empty").await,
        Err(SecretSourceError::InvalidPayload(_))
    ));
}

#[tokio::test]
async fn test_unreachable_source_is_request_error() {
    // Nothing listens on the discard port
    let source = HttpSecretSource::new("http://127.0.0.1:9".to_string(), None);

    assert!(matches!(
        source.fetch_secret(TEST_SECRET_ID).await,
        Err(SecretSourceError::Request(_))
    ));
}

// ============================================================================
// Loader fallback rules
// ============================================================================

#[tokio::test]
async fn test_required_secret_loads_from_source() -> Result<(), anyhow::Error> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(secret_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            KeySetJsonBuilder::new(TEST_KEY_ID_2, 2)
                .with_previous(TEST_KEY_ID_1, 1)
                .build(),
        ))
        .mount(&mock_server)
        .await;

    let (config, kind) = loader(
        SecretLookup::Required(TEST_SECRET_ID.to_string()),
        http_source(&mock_server),
    )
    .with_vars(test_key_env_vars("env-key", 3))
    .load()
    .await?;

    assert_eq!(kind, KeySourceKind::SecretSource);
    assert_eq!(config.active_kid, TEST_KEY_ID_2);
    assert!(config.get(TEST_KEY_ID_1).is_some());
    Ok(())
}

#[tokio::test]
async fn test_required_secret_failure_does_not_fall_back() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let result = loader(
        SecretLookup::Required(TEST_SECRET_ID.to_string()),
        http_source(&mock_server),
    )
    .with_vars(test_key_env_vars("env-key", 3))
    .load()
    .await;

    assert!(matches!(result, Err(KeyStoreError::SecretSource(_))));
}

#[tokio::test]
async fn test_optional_secret_failure_falls_back_to_environment() -> Result<(), anyhow::Error> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (config, kind) = loader(
        SecretLookup::Optional(TEST_SECRET_ID.to_string()),
        http_source(&mock_server),
    )
    .with_vars(test_key_env_vars("env-key", 3))
    .load()
    .await?;

    assert_eq!(kind, KeySourceKind::Environment);
    assert_eq!(config.active_kid, "env-key");
    Ok(())
}
