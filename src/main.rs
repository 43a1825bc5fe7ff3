//! metrics-k8s-proxy HTTP server
//!
//! Watches the cluster for scrape targets and serves the aggregated payload.

use clap::Parser;
use metrics_k8s_proxy::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    discovery::{KubePodSource, Watcher},
    error::{AppError, AppResult},
    handlers::{self, AppState},
    telemetry,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = &cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template)?;
                println!("Configuration template written to {}", path.display());
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref(), cli.overrides())?;
    telemetry::init(&config.observability.log_level);

    run(Arc::new(config)).await?;
    Ok(())
}

async fn run(config: Arc<Config>) -> AppResult<()> {
    let state = AppState::from_config(config.clone())?;

    let client = kube::Client::try_default()
        .await
        .map_err(|e| AppError::Cluster(format!("failed to build Kubernetes client: {}", e)))?;

    let shutdown = CancellationToken::new();
    let watcher = Watcher::new(
        Arc::new(KubePodSource::new(client)),
        state.registry(),
        state.metrics(),
        config.discovery.namespace().map(str::to_string),
        config.discovery.label_selector(),
        config.discovery.reconnect_delay,
    );
    let watch_handle = watcher.spawn(shutdown.clone());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        address = %addr,
        selector = %config.discovery.label_selector(),
        namespace = config.discovery.namespace().unwrap_or("<all>"),
        scrape_timeout = %humantime::format_duration(config.scrape.timeout),
        "Serving aggregated metrics on http://{}/metrics",
        addr
    );

    let serve_result = axum::serve(listener, handlers::router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Err(e) = watch_handle.await {
        tracing::warn!(error = %e, "Pod watch monitor did not exit cleanly");
    }

    serve_result?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT/SIGTERM, or when `shutdown` is cancelled elsewhere
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        _ = shutdown.cancelled() => {}
    }
}
