//! Harvest forecast server
//!
//! Serves days/yield predictions over HTTP, hot-reloading model artifacts
//! whenever their files change on disk.

use anyhow::Result;
use forecast_lib::{
    health::{components, HealthRegistry},
    ArtifactCache, PredictionEngine, StructuredLogger,
};
use forecast_server::{api, AppState, ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting harvest-forecast server");

    let config = ServerConfig::load()?;
    let paths = config.artifact_paths();
    info!(
        model_path_days = ?paths.days_model,
        model_path_yield = ?paths.yield_model,
        preproc_path = ?paths.preprocessor,
        feature_meta_path = ?paths.feature_meta,
        required_features = ?paths.required_features,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACTS).await;
    health_registry.register(components::PREDICTOR).await;

    let logger = StructuredLogger::new(&config.instance_name);
    let engine = PredictionEngine::new().with_required(config.required_features());
    let state = Arc::new(AppState::new(
        ArtifactCache::new(paths),
        engine,
        health_registry.clone(),
        logger.clone(),
    ));

    // Warm the cache; a failure here is retried on the next request
    if let Err(e) = state.bundle().await {
        warn!(error = %e, "Initial artifact load failed");
    }
    health_registry.set_ready(true).await;

    logger.log_startup(SERVICE_VERSION, &config.api_host, config.api_port);

    let host = config.api_host.clone();
    let port = config.api_port;
    let api_handle = tokio::spawn(async move { api::serve(&host, port, state).await });

    tokio::select! {
        result = api_handle => {
            result??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
        }
    }

    Ok(())
}
