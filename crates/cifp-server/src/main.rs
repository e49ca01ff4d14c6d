//! CIFP Server - Main entry point

use anyhow::{Context, Result};
use cifp_common::logging::{init_logging, LogConfig};
use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, sync::Notify};
use tracing::{error, info, warn};

use cifp_server::{
    auth::{AuthGate, GoogleTokenVerifier},
    config::Config,
    db::{self, PgCycleStore},
    features::{self, AppState},
    process::ProcessPipeline,
    storage::{config::StorageConfig, S3ObjectSink},
};

/// Timeout for outbound HTTP requests that have no tighter deadline.
const HTTP_CLIENT_TIMEOUT_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig {
        log_file_prefix: "cifp-server".to_string(),
        filter_directives: Some(
            "cifp_server=debug,cifp_enhance=info,tower_http=debug,sqlx=warn".to_string(),
        ),
        ..LogConfig::default()
    }
    .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting CIFP Server");

    let config = Config::load()?;
    info!(host = %config.server.host, port = config.server.port, "Configuration loaded");

    let db_pool = db::create_pool(&config.database).await?;
    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .context("Failed to run migrations")?;
    info!("Cycle metadata store ready");

    let storage_config = StorageConfig::from_env()?;
    let bucket = storage_config.bucket.clone();
    let sink = S3ObjectSink::new(storage_config).await?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("cifp-server/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS.max(config.process.process_timeout_secs)))
        .build()?;

    let verifier = GoogleTokenVerifier::new(http.clone(), config.auth.tokeninfo_url.clone());
    let gate = AuthGate::new(Arc::new(verifier), config.auth.policy()?);

    let cycles = Arc::new(PgCycleStore::new(db_pool));
    let pipeline = ProcessPipeline::new(
        config.process.clone(),
        bucket,
        gate,
        cycles.clone(),
        Arc::new(sink),
        http,
    );

    let app = features::router(AppState::new(pipeline, cycles));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    let stopping = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let stopping = stopping.clone();
            async move {
                let received = wait_for_signal().await;
                info!(received, drain_secs = drain.as_secs(), "Shutting down, draining connections");
                stopping.notify_one();
            }
        })
        .into_future();

    // In-flight runs are cut off once the drain period is over.
    tokio::select! {
        result = server => result?,
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(drain).await;
        } => warn!("Connections still open after the drain period, exiting"),
    }

    info!("Server shut down");

    Ok(())
}

/// Resolves with the name of the first shutdown signal received.
async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
