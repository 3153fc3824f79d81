//! Trustline Gateway
//!
//! HTTP service in front of the content trust pipeline. Every content
//! surface of the platform (chat, posts, comments, media upload) calls
//! this service to evaluate content; admin tooling uses it for suspension
//! management, event queries, and guardian notifications.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

use trustline_core::TrustConfig;

mod dispatch;
mod routes;
mod state;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "trustline-gateway")]
#[command(about = "Trustline content trust pipeline gateway", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "trustline.yaml")]
    config: String,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8080")]
    port: u16,

    /// Directory for the durable event journal
    #[arg(short, long, default_value = "./events")]
    journal_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting Trustline Gateway");

    let config = TrustConfig::load(&cli.config)?;
    info!("Configuration loaded");
    info!("Classifier endpoint: {}", config.classifier.endpoint);
    info!("Strike threshold: {}", config.strikes.threshold);

    let metrics_handle = init_metrics()?;

    let state = AppState::new(config.clone(), cli.journal_dir, metrics_handle)?;
    info!("Pipeline state initialized");

    // Notification delivery loop, when a webhook is configured.
    if let Some(ref url) = config.notification_webhook {
        let _dispatch_loop = dispatch::spawn_dispatch_loop(
            state.queue.clone(),
            dispatch::WebhookDispatcher::new(url.as_str(), config.classifier.timeout())?,
            std::time::Duration::from_secs(30),
        );
        info!("Notification dispatcher started for {}", url);
    } else {
        warn!("No notification webhook configured; guardian alerts stay queued");
    }

    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Shutdown signal received, stopping server...");
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("trustline=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trustline=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "trustline_evaluations_total",
        "Evaluations processed, by surface and outcome"
    );
    metrics::describe_counter!(
        "trustline_layer1_blocks_total",
        "Blocks decided by the pattern filter without classifier involvement"
    );
    metrics::describe_counter!(
        "trustline_classifier_fallbacks_total",
        "Classifier failures that were resolved by failing open"
    );
    metrics::describe_counter!("trustline_strikes_total", "Blocked events recorded");
    metrics::describe_counter!(
        "trustline_escalations_total",
        "Accounts suspended by the strike threshold"
    );
    metrics::describe_counter!(
        "trustline_verify_failures_total",
        "Async chat verifications that failed internally"
    );
    metrics::describe_counter!(
        "trustline_notifications_total",
        "Guardian notification deliveries, by status"
    );
    metrics::describe_histogram!(
        "trustline_pipeline_latency_us",
        metrics::Unit::Microseconds,
        "Evaluate latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
