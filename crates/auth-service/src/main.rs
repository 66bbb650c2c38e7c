//! Token lifecycle service
//!
//! Issues and rotates RS256 tokens, serves revocation and identity endpoints,
//! and keeps the signing key set fresh in the background.

use auth_service::cache::{InMemoryCache, RedisCache, SharedCache};
use auth_service::config::Config;
use auth_service::keys::{spawn_key_refresh, HttpSecretSource, KeyLoader, KeyRefresher, SecretSource};
use auth_service::observability::metrics::init_metrics_recorder;
use auth_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting auth service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        key_cache_ttl_secs = config.key_cache_ttl.as_secs(),
        jwt_clock_skew_secs = config.jwt_clock_skew.as_secs(),
        shared_cache = config.redis_url.is_some(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    // Load signing keys. A configured secret source that fails aborts startup.
    let secret_source: Option<Arc<dyn SecretSource>> =
        config.secret_source_url.as_ref().map(|url| {
            Arc::new(HttpSecretSource::new(
                url.clone(),
                config.secret_source_token.clone(),
            )) as Arc<dyn SecretSource>
        });
    let loader = KeyLoader::new(config.key_sources.clone(), secret_source);

    let refresher = Arc::new(
        KeyRefresher::bootstrap(loader, config.key_cache_ttl)
            .await
            .map_err(|e| {
                error!("Failed to load signing keys: {}", e);
                e
            })?,
    );
    let keys = refresher.store();

    // Shared cache for revocation and rate limiting
    let cache: Arc<dyn SharedCache> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            e
        })?),
        None => {
            warn!(
                "AUTH_ALLOW_LOCAL_CACHE set without REDIS_URL; revocations and rate limits are local to this process"
            );
            Arc::new(InMemoryCache::new())
        }
    };

    let bind_address = config.bind_address.clone();
    let key_cache_ttl = config.key_cache_ttl;

    let state = Arc::new(AppState::new(keys, cache, config));

    // Missing private key material must surface now, not on the first request
    let active_kid = state.issuer.check_ready().map_err(|e| {
        error!("Signing key unusable: {}", e);
        e
    })?;
    info!(active_kid = %active_kid, "Signing key ready");

    let refresh_task = spawn_key_refresh(refresher, key_cache_ttl);

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Auth service listening on {}", addr);

    // Start server with ConnectInfo support for per-client rate limiting
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    refresh_task.abort();
    info!("Auth service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
