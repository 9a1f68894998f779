use anyhow::Result;
use sports_arbitrage_detector::{config::Config, service::DetectorService};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting sports arbitrage detector");

    // Load configuration
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    let service = Arc::new(DetectorService::new(config).await.map_err(|e| {
        error!("Failed to initialize detector: {}", e);
        e
    })?);

    // Handle graceful shutdown
    let signal_service = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_service.stop();
        }
    });

    let source = service.build_source();
    match service.run(source).await {
        Ok(_) => info!("Detector completed successfully"),
        Err(e) => error!("Detector error: {}", e),
    }

    info!("Sports arbitrage detector shutdown complete");
    Ok(())
}
