use std::path::Path;

use live_engine::utils::file_io;
use live_engine::Error;
use live_engine::LiveConfig;
use live_engine::LiveNodeBuilder;
use live_engine::NodeId;
use live_engine::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = LiveConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(config.node.node_id, &config.node.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let node = LiveNodeBuilder::init(config, graceful_rx.clone())
        .build()?
        .start_metrics_server(graceful_rx.clone())
        .ready()?;

    info!("Application started. Waiting for shutdown signal...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = node.run().await {
        error!("node stops: {:?}", e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx
        .send(())
        .map_err(|e| Error::Fatal(format!("Failed to send shutdown signal: {}", e)))?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(
    node_id: NodeId,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    let log_file = file_io::open_file_for_append(&log_dir.join(format!("{}/live.log", node_id)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
