//! Duo Signal server.
//!
//! # Startup Flow
//!
//! 1. Load and validate configuration
//! 2. Initialize tracing
//! 3. Pick the quota store (Redis when configured, in-memory otherwise)
//! 4. Wire the signaling services
//! 5. Spawn the expiry sweep and session tick
//! 6. Serve WebSocket and health routes until Ctrl+C

use std::sync::Arc;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duo_signal::adapters::{
    signaling_router, AppState, InMemoryQuotaStore, InMemorySignalingStore, RedisQuotaStore,
    StaticRelationshipChecker, StubMediaProvider, SystemClock,
};
use duo_signal::application::{Collaborators, SignalingServices};
use duo_signal::config::{AppConfig, RedisConfig, ServerConfig};
use duo_signal::ports::QuotaStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config.server);
    tracing::info!(
        environment = ?config.server.environment,
        ring_timeout_secs = config.calls.ring_timeout_secs,
        monthly_cap_secs = config.calls.monthly_cap_secs,
        per_call_ceiling_secs = config.calls.per_call_ceiling_secs,
        "Starting Duo Signal"
    );

    let quota_store = quota_store(config.redis.as_ref()).await?;

    let services = SignalingServices::build(
        &config.calls,
        Collaborators {
            relationships: Arc::new(StaticRelationshipChecker::permissive()),
            quota_store,
            store: Arc::new(InMemorySignalingStore::new()),
            media: Arc::new(StubMediaProvider::new()),
            clock: Arc::new(SystemClock),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();
    for task in services.periodic_tasks() {
        let rx = shutdown_rx.clone();
        background.push(tokio::spawn(async move { task.run(rx).await }));
    }

    let state = AppState::new(
        services.dispatcher.clone(),
        config.server.connection_queue_capacity,
    );
    let app = signaling_router(state).layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
        e
    })?;
    tracing::info!(addr = %addr, "Signaling server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, stopping background tasks");
    // Receivers only need the flip; a send error means they are gone already.
    let _ = shutdown_tx.send(true);
    for task in background {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Duo Signal shutdown complete");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| server.log_level.clone().into());

    if server.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn quota_store(
    redis: Option<&RedisConfig>,
) -> Result<Arc<dyn QuotaStore>, Box<dyn std::error::Error>> {
    let Some(redis) = redis else {
        tracing::info!("No Redis configured, using in-memory quota store");
        return Ok(Arc::new(InMemoryQuotaStore::new()));
    };

    let client = redis::Client::open(redis.url.as_str())?;
    let conn = tokio::time::timeout(redis.timeout(), client.get_multiplexed_tokio_connection())
        .await
        .map_err(|_| {
            tracing::error!(timeout_secs = redis.timeout_secs, "Redis connection timed out");
            "Redis connection timed out"
        })??;
    tracing::info!(key_prefix = %redis.key_prefix, "Redis quota store connected");

    Ok(Arc::new(RedisQuotaStore::new(conn, redis.key_prefix.clone())))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
