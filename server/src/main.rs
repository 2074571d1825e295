//! Lost & Found Admin Server - Main Entry Point
//!
//! Back office for the lost-and-found platform.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use lf_admin_server::{
    api, auth::HttpIdentityProvider, clock::SystemClock, config, db,
    ratelimit::{RateLimitConfig, RateLimiter},
};

const SESSION_SWEEP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lf_admin_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "Starting Lost & Found Admin Server"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;
    let store = Arc::new(db::PgStore::new(db_pool));

    let clock = Arc::new(SystemClock);

    // Initialize rate limiter (optional, Redis when configured)
    let rate_limiter = {
        let rl_config = RateLimitConfig::from_env(config.environment.is_production());
        if !rl_config.enabled {
            info!("Rate limiting disabled by configuration");
            None
        } else if let Some(redis_url) = &config.redis_url {
            let redis = db::create_redis_client(redis_url).await?;
            let limiter = RateLimiter::redis(redis, rl_config);
            match limiter.init().await {
                Ok(()) => {
                    info!(backend = limiter.backend_name(), "Rate limiter initialized");
                    Some(limiter)
                }
                Err(e) => {
                    warn!("Rate limiter initialization failed: {}. Rate limiting disabled.", e);
                    None
                }
            }
        } else {
            let limiter = RateLimiter::in_memory(rl_config, clock.clone());
            limiter.spawn_sweeper();
            info!(backend = limiter.backend_name(), "Rate limiter initialized");
            Some(limiter)
        }
    };

    let identity = Arc::new(HttpIdentityProvider::new(
        config.identity_url.clone(),
        config.identity_api_key.clone(),
    ));

    // Build application state
    let state = api::AppState::new(api::AppStateConfig {
        config: config.clone(),
        identity,
        admins: store.clone(),
        attempts: store.clone(),
        audit: store.clone(),
        settings: store,
        rate_limiter,
        clock,
    });

    // Drop expired 2FA session flags
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            sessions.purge_expired();
        }
    });

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("Server shutdown complete");

    Ok(())
}
