use std::sync::Arc;
use std::time::Duration;

use riptide_api::{extraction_router, metrics_router, AppState};
use riptide_headless::{BrowserPool, BrowserPoolConfig, ChromiumoxideDriver, CircuitBreaker, ExtractionPipeline, PoolMetrics, Watchdog};
use riptide_types::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }
    if !config.secret_configured() {
        tracing::warn!("EXTRACTION_SECRET not set; /extract will reject every request with 500");
    }
    let config = Arc::new(config);

    tracing::info!(
        port = config.port,
        metrics_port = config.metrics_port,
        max_concurrent = config.max_concurrent,
        "starting extraction service"
    );

    let pool = BrowserPool::new(
        Arc::new(ChromiumoxideDriver),
        BrowserPoolConfig {
            max_concurrent: config.max_concurrent,
            idle_timeout: Duration::from_millis(config.browser_idle_timeout_ms),
            max_age: Duration::from_millis(config.browser_max_age_ms),
            chrome_path: config.chrome_path.clone(),
        },
        Arc::new(CircuitBreaker::new()),
        Arc::new(PoolMetrics::new()),
    );
    let pipeline = Arc::new(ExtractionPipeline::new(pool.clone()));

    let watchdog = Watchdog::new(
        pool.clone(),
        Duration::from_millis(config.circuit_breaker_exit_threshold_ms),
    );
    watchdog.spawn();

    let state = AppState {
        config: config.clone(),
        pool: pool.clone(),
        pipeline,
    };

    let extract_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.metrics_port)).await?;

    let extract_server = axum::serve(extract_listener, extraction_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let metrics_server = axum::serve(metrics_listener, metrics_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());

    tracing::info!("listening for extraction requests and metrics scrapes");
    let (extract_result, metrics_result) = tokio::join!(extract_server, metrics_server);
    extract_result?;
    metrics_result?;

    watchdog.disable();
    let drain = Duration::from_millis(config.shutdown_timeout_ms);
    tracing::info!(drain_ms = drain.as_millis(), "draining in-flight extractions");
    pool.shutdown(drain).await;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
