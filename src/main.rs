use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sink_bus::{App, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sink_bus=debug")),
        )
        .init();

    tracing::info!("🚀 Starting in-memory event bus");

    // === 1. Configuration ===
    let config = AppConfig::load()?;
    tracing::info!(
        buffer = ?config.bus.buffer,
        max_in_flight = config.pipeline.max_in_flight,
        retry_attempts = config.pipeline.retry.max_attempts,
        "Configuration loaded"
    );

    // === 2. Wire bus, stages and pipeline ===
    let app = Arc::new(App::from_config(config)?);
    tracing::info!("📊 Metrics registry created with {} metrics", app.metrics.registry().gather().len());

    // === 3. Start the pipeline before producers attach ===
    app.start();

    // === 4. HTTP ingress + metrics on its own actix runtime ===
    if app.config.http.enabled {
        let http_app = app.clone();
        let host = app.config.http.host.clone();
        let port = app.config.http.port;
        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(sink_bus::http::start_http_server(http_app, host, port)) {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    // === 5. Simulated startup producer ===
    app.publish_samples()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown signal received, draining pipeline");

    app.shutdown().await;

    Ok(())
}
