//! Test server harness for E2E testing
//!
//! Provides TestAuthServer for spawning real auth service instances in tests.

use crate::crypto_fixtures::test_key_store;
use crate::test_ids::TEST_KEY_ID_1;
use auth_service::cache::{InMemoryCache, SharedCache};
use auth_service::config::Config;
use auth_service::keys::KeyStore;
use auth_service::models::Role;
use auth_service::observability::metrics::init_metrics_recorder;
use auth_service::routes::{self, AppState};
use auth_service::services::{TokenIssuer, TokenPair, TokenSubject};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Configuration with every default over the process-local cache.
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// Default configuration overridden by `vars`.
///
/// # Panics
/// Panics if the overrides do not form a valid configuration.
pub fn test_config_with(vars: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    // The harness always runs one process over an in-memory cache
    vars.entry("AUTH_ALLOW_LOCAL_CACHE".to_string())
        .or_insert_with(|| "true".to_string());
    Config::from_vars(&vars).expect("test configuration is valid")
}

/// Test harness for spawning the auth service in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_refresh_flow_e2e() -> Result<()> {
///     let server = TestAuthServer::spawn().await?;
///     let pair = server.issue_tokens(TEST_USER_ALICE, Role::Caregiver)?;
///
///     let response = reqwest::Client::new()
///         .post(format!("{}/api/v1/auth/refresh", server.url()))
///         .json(&json!({ "refreshToken": pair.refresh.token }))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAuthServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    handle: JoinHandle<()>,
}

impl TestAuthServer {
    /// Spawn a server signing with fixture pair 1 under [`TEST_KEY_ID_1`],
    /// backed by a fresh in-memory cache.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(
            test_key_store(TEST_KEY_ID_1),
            Arc::new(InMemoryCache::new()),
            test_config(),
        )
        .await
    }

    /// Spawn a server over the given key store, cache and configuration.
    ///
    /// The server binds to a random port on 127.0.0.1 and serves with
    /// connect info so per-client rate limiting sees the peer address.
    pub async fn spawn_with(
        keys: Arc<KeyStore>,
        cache: Arc<dyn SharedCache>,
        config: Config,
    ) -> Result<Self, anyhow::Error> {
        let state = Arc::new(AppState::new(keys, cache, config));

        // Only one global recorder per process; later servers get a
        // standalone recorder that is never installed.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes(state.clone(), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state of the running server, for reaching its services directly
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.state.issuer
    }

    /// Issue an access and refresh token pair for `user_id` in the north zone.
    pub fn issue_tokens(&self, user_id: &str, role: Role) -> Result<TokenPair, anyhow::Error> {
        let subject = TokenSubject::new(user_id, role, crate::test_ids::TEST_ZONE_NORTH);
        Ok(self.state.issuer.issue_token_pair(&subject)?)
    }
}

impl Drop for TestAuthServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
