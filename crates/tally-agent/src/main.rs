use anyhow::{Context, Result};
use tally_agent::{AgentConfig, HttpTransport, Reporter, Scraper};
use tokio::sync::mpsc;
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
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    let endpoint = config.endpoint_url();
    tracing::info!(server = %endpoint, "tally-agent starting");

    let transport = HttpTransport::new(&endpoint, config.request_timeout())
        .context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(config.queue_capacity);

    let scraper = Scraper::new(
        tally_collector::default_collectors(),
        tx,
        config.poll_interval(),
    );
    let dropped = scraper.dropped_counter();
    let reporter = Reporter::new(
        transport,
        rx,
        config.retry_policy(),
        config.report_interval(),
        config.shutdown_grace(),
        cancel.child_token(),
    );

    tracing::info!(
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        queue_capacity = config.queue_capacity,
        "Starting agent pipeline"
    );

    let scraper_task = tokio::spawn(scraper.run(cancel.child_token()));
    let reporter_task = tokio::spawn(reporter.run(cancel.child_token()));

    shutdown_signal().await;
    tracing::info!("Shutting down gracefully");
    cancel.cancel();

    // The reporter bounds its own flush; this guards against a stuck task.
    let grace = config.shutdown_grace() * 2;
    let joined = tokio::time::timeout(grace, async {
        let _ = scraper_task.await;
        let _ = reporter_task.await;
    })
    .await;
    if joined.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "Tasks did not stop in time, exiting");
    }

    tracing::info!(
        dropped_batches = dropped.load(std::sync::atomic::Ordering::Relaxed),
        "tally-agent stopped"
    );
    Ok(())
}
