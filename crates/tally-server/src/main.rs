use anyhow::{Context, Result};
use tally_server::app;
use tally_server::config::ServerConfig;
use tally_server::service::MetricsService;
use tally_server::state::{self, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tally=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());

    let config = ServerConfig::load(&config_path)?;
    let addr = config.listen_socket_addr()?;
    tracing::info!(addr = %addr, "tally-server starting");

    let cancel = CancellationToken::new();
    let (store, persistence) = state::build_store(&config, cancel.child_token()).await?;
    let persistence_handle = persistence
        .clone()
        .and_then(|scheduler| scheduler.spawn(cancel.child_token()));

    let app = app::build_http_app(AppState::new(MetricsService::new(store, persistence)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Server started");

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutting down gracefully");
            shutdown.cancel();
        })
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "HTTP server error");
    }
    cancel.cancel();

    if let Some(handle) = persistence_handle {
        let grace = config.shutdown_grace();
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!(grace_secs = grace.as_secs(), "Final snapshot did not finish in time");
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
