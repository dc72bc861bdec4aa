use handoff_service::clock::{Clock, SystemClock};
use handoff_service::config::HandoffConfig;
use handoff_service::services::metrics::init_metrics;
use handoff_service::services::{ArtifactResolver, HttpArtifactResolver, StaticArtifactResolver};
use handoff_service::startup::build_router;
use handoff_service::store::{EphemeralStore, MemoryStore, RedisStore};
use handoff_service::AppState;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = HandoffConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    init_metrics()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store: Arc<dyn EphemeralStore> = match config.redis.url.as_deref() {
        Some(url) => {
            let redis = RedisStore::new(url).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to Redis");
                e
            })?;
            tracing::info!("Using Redis for handoff records");
            Arc::new(redis)
        }
        None => {
            let memory = MemoryStore::new(clock.clone());
            memory.spawn_sweeper(SWEEP_INTERVAL);
            tracing::warn!("REDIS_URL not set, handoff records live in process memory");
            Arc::new(memory)
        }
    };

    let resolver: Arc<dyn ArtifactResolver> = match config.artifacts.provider_url.as_deref() {
        Some(url) => Arc::new(HttpArtifactResolver::new(url)),
        None => {
            tracing::warn!("ARTIFACT_PROVIDER_URL not set, direct links fall back to targets");
            Arc::new(StaticArtifactResolver::new())
        }
    };

    let address = config.common.socket_addr();
    let service_name = config.service_name.clone();
    let state = AppState::new(config, store, clock, resolver);
    let app = build_router(state);

    let listener = TcpListener::bind(address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    tracing::info!("Starting {} on {}", service_name, address);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    tracing::info!("Server stopped");
    Ok(())
}
