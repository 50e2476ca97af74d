//! ArticleHub API Gateway
//!
//! The HTTP entry point for the article catalogue.
//! Handles:
//! - Filtered article listing and advanced (AI) search
//! - Import, update and cascading delete
//! - Rate limiting
//! - Observability (logging, metrics, tracing)

mod extract;
mod handlers;
mod middleware;
mod router;
mod state;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use articlehub_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self as app_metrics, EXTERNAL_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tokio::{signal, sync::Notify};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration; APP_CONFIG_FILE points at an explicit file
    let config = match std::env::var("APP_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::load()?,
    };

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting ArticleHub API Gateway v{}",
        articlehub_common::VERSION
    );

    // Initialize metrics
    init_metrics(&config.observability)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let grace = config.shutdown_timeout();

    let state = AppState::from_config(config).await.map_err(|e| {
        error!(error = %e, "Failed to initialise application state");
        e
    })?;
    info!(store = state.store.backend(), "Application state ready");

    // Build the router
    let app = router::create_router(state);

    // Start the server
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        notify.notify_one();
    });
    serve_with_grace(server, &signalled, grace).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus exporter; a port of 0 leaves metrics unexported
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_external_duration_seconds", METRICS_PREFIX)),
            EXTERNAL_BUCKETS,
        )?
        .install()?;

    app_metrics::register_metrics();
    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

/// Drive the server; once shutdown starts, open connections get `grace` to drain
async fn serve_with_grace<S>(server: S, signalled: &Notify, grace: Duration) -> std::io::Result<()>
where
    S: IntoFuture<Output = std::io::Result<()>>,
{
    let server = server.into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = signalled.notified() => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed, dropping open connections"
            );
            Ok(())
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
