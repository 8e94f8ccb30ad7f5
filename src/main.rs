//! Threat Monitor
//!
//! Main entry point: wires the orchestrator and serves the status API.

use std::sync::Arc;
use threat_monitor::{
    orchestrator::MonitorOrchestrator,
    state::{AppConfig, AppState},
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threat_monitor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Threat Monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        registry_url = %config.registry_url,
        detector_url = %config.detector_url,
        registry_interval_sec = config.registry_interval.as_secs(),
        detection_interval_sec = config.detection_interval.as_secs(),
        log_capacity = config.log_capacity,
        "Configuration loaded"
    );

    let orchestrator = Arc::new(MonitorOrchestrator::from_config(&config)?);
    orchestrator.start().await;

    let state = AppState {
        config: config.clone(),
        orchestrator: orchestrator.clone(),
    };

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.stop().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
}
