//! Integration tests for signing key rotation
//!
//! A rotation publishes a new active key while the previous key stays in the
//! set for verification, so tokens issued before the rotation keep working
//! until they expire or their key is removed.

use auth_service::errors::TokenError;
use auth_service::keys::{
    KeyLoader, KeyRefresher, KeyRetentionPolicy, KeySourceSettings, KeyStoreError, RefreshOutcome,
    SecretLookup, SecretSource,
};
use auth_service::models::Role;
use auth_service::services::{TokenIssuer, TokenSubject, TokenVerifier};
use auth_test_utils::{
    KeySetJsonBuilder, StaticSecretSource, TestClaimsBuilder, TokenAssertions, TEST_KEY_ID_1,
    TEST_KEY_ID_2, TEST_KEY_ID_3, TEST_SECRET_ID, TEST_USER_ALICE, TEST_ZONE_NORTH,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CLOCK_SKEW: Duration = Duration::from_secs(300);

async fn bootstrap(
    source: &Arc<StaticSecretSource>,
    retention: KeyRetentionPolicy,
) -> Result<KeyRefresher, KeyStoreError> {
    let settings = KeySourceSettings {
        secret_lookup: SecretLookup::Required(TEST_SECRET_ID.to_string()),
        retention,
    };
    let loader = KeyLoader::new(
        settings,
        Some(Arc::clone(source) as Arc<dyn SecretSource>),
    )
    .with_vars(HashMap::new());
    KeyRefresher::bootstrap(loader, Duration::from_secs(300)).await
}

fn subject() -> TokenSubject {
    TokenSubject::new(TEST_USER_ALICE, Role::Coordinator, TEST_ZONE_NORTH)
}

#[tokio::test]
async fn test_tokens_survive_rotation() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticSecretSource::new());
    source.set(TEST_SECRET_ID, &KeySetJsonBuilder::new(TEST_KEY_ID_1, 1).build());

    let refresher = bootstrap(&source, KeyRetentionPolicy::default()).await?;
    let issuer = TokenIssuer::new(refresher.store());
    let verifier = TokenVerifier::new(refresher.store(), CLOCK_SKEW);

    let before = issuer.issue_access_token(&subject())?;
    before.token.assert_signed_by(TEST_KEY_ID_1);

    // Rotate: key 2 becomes active, key 1 stays for verification
    source.set(
        TEST_SECRET_ID,
        &KeySetJsonBuilder::new(TEST_KEY_ID_2, 2)
            .with_previous(TEST_KEY_ID_1, 1)
            .build(),
    );
    assert_eq!(refresher.force_refresh().await?, RefreshOutcome::Replaced);

    let after = issuer.issue_access_token(&subject())?;
    after.token.assert_signed_by(TEST_KEY_ID_2);

    assert!(
        verifier.verify_access(&before.token).is_ok(),
        "Token signed before rotation should still verify"
    );
    assert!(verifier.verify_access(&after.token).is_ok());

    Ok(())
}

#[tokio::test]
async fn test_removed_key_no_longer_verifies() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticSecretSource::new());
    source.set(TEST_SECRET_ID, &KeySetJsonBuilder::new(TEST_KEY_ID_1, 1).build());

    let refresher = bootstrap(&source, KeyRetentionPolicy::default()).await?;
    let issuer = TokenIssuer::new(refresher.store());
    let verifier = TokenVerifier::new(refresher.store(), CLOCK_SKEW);
    let old = issuer.issue_access_token(&subject())?;

    source.set(TEST_SECRET_ID, &KeySetJsonBuilder::new(TEST_KEY_ID_2, 2).build());
    refresher.force_refresh().await?;

    assert_eq!(
        verifier.verify_access(&old.token),
        Err(TokenError::UnknownKey)
    );
    assert!(!refresher.store().contains(TEST_KEY_ID_1));

    Ok(())
}

#[tokio::test]
async fn test_token_without_kid_tries_every_key() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticSecretSource::new());
    source.set(
        TEST_SECRET_ID,
        &KeySetJsonBuilder::new(TEST_KEY_ID_2, 2)
            .with_previous(TEST_KEY_ID_1, 1)
            .build(),
    );
    let refresher = bootstrap(&source, KeyRetentionPolicy::default()).await?;
    let verifier = TokenVerifier::new(refresher.store(), CLOCK_SKEW);

    // Signed by the verification-only key with no kid in the header
    let claims = TestClaimsBuilder::new().build();
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(auth_test_utils::TEST_PRIVATE_KEY_1.as_bytes())?;
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
        &claims,
        &key,
    )?;

    let verified = verifier.verify_access(&token)?;
    assert_eq!(verified.jti, claims.jti);

    Ok(())
}

#[tokio::test]
async fn test_retired_key_past_grace_is_dropped_on_load() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticSecretSource::new());
    source.set(
        TEST_SECRET_ID,
        &KeySetJsonBuilder::new(TEST_KEY_ID_3, 3)
            .with_retired_previous(TEST_KEY_ID_1, 1, "2020-01-01T00:00:00Z")
            .with_previous(TEST_KEY_ID_2, 2)
            .build(),
    );

    let refresher = bootstrap(
        &source,
        KeyRetentionPolicy {
            grace_period: Some(Duration::from_secs(24 * 3600)),
            purge_retired_private_keys: true,
        },
    )
    .await?;
    let store = refresher.store();

    assert!(!store.contains(TEST_KEY_ID_1), "Retired key should be dropped");
    assert!(store.contains(TEST_KEY_ID_2), "Key without retiredAt is kept");
    assert!(store.contains(TEST_KEY_ID_3));

    let verifier = TokenVerifier::new(store, CLOCK_SKEW);
    let stale = TestClaimsBuilder::new().sign(1, TEST_KEY_ID_1);
    assert_eq!(verifier.verify_access(&stale), Err(TokenError::UnknownKey));

    Ok(())
}

#[tokio::test]
async fn test_rotation_to_unsignable_key_keeps_current_set() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticSecretSource::new());
    source.set(TEST_SECRET_ID, &KeySetJsonBuilder::new(TEST_KEY_ID_1, 1).build());
    let refresher = bootstrap(&source, KeyRetentionPolicy::default()).await?;

    // Active key published without its private half
    let document = serde_json::json!({
        "activeKid": TEST_KEY_ID_2,
        "keys": { TEST_KEY_ID_2: { "publicKey": auth_test_utils::TEST_PUBLIC_KEY_2 } },
    })
    .to_string();
    source.set(TEST_SECRET_ID, &document);

    assert!(matches!(
        refresher.force_refresh().await,
        Err(KeyStoreError::MissingPrivateKey(_))
    ));
    assert_eq!(refresher.store().active_kid(), TEST_KEY_ID_1);

    let issuer = TokenIssuer::new(refresher.store());
    issuer
        .issue_access_token(&subject())?
        .token
        .assert_signed_by(TEST_KEY_ID_1);

    Ok(())
}

#[tokio::test]
async fn test_base64_encoded_key_set_loads() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticSecretSource::new());
    source.set(
        TEST_SECRET_ID,
        &KeySetJsonBuilder::new(TEST_KEY_ID_2, 2)
            .with_previous(TEST_KEY_ID_1, 1)
            .base64_encoded()
            .build(),
    );

    let refresher = bootstrap(&source, KeyRetentionPolicy::default()).await?;
    let mut kids = refresher.store().known_kids();
    kids.sort();
    assert_eq!(kids, vec![TEST_KEY_ID_1, TEST_KEY_ID_2]);

    Ok(())
}
