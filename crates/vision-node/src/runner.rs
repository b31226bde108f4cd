//! Node runner utilities for standard main() implementations.

use std::time::Duration;
use tokio::sync::watch;

use crate::error::NodeError;
use crate::store::StoreError;
use crate::traits::VisionNode;

/// Initialize logging with env_logger.
///
/// Respects RUST_LOG environment variable. Defaults to "info" level.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Set up a shutdown channel triggered by SIGINT/SIGTERM.
///
/// Returns the sender (kept alive by the caller) and a receiver for the node.
pub fn setup_shutdown() -> Result<(watch::Sender<()>, watch::Receiver<()>), NodeError> {
    let (tx, rx) = watch::channel(());
    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    })?;
    Ok((tx, rx))
}

/// Build the HTTP client used for every store and stream call.
///
/// All network calls carry a bounded timeout so a stalled peer cannot
/// block a node loop forever.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, StoreError> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(StoreError::Http)
}

/// Run a node with an already merged configuration.
///
/// Logging must be set up by the caller (so config loading can log).
/// This handles:
/// - Startup banner
/// - Graceful shutdown on Ctrl+C
/// - Node init (aborts on failure) and the node loop
///
/// ```rust,ignore
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     setup_logging();
///     let config = Config::from_args(argh::from_env())?;
///     run_node::<CameraMovementNode>(config).await?;
///     Ok(())
/// }
/// ```
pub async fn run_node<N: VisionNode>(config: N::Config) -> Result<(), NodeError> {
    let metadata = N::metadata();
    log::info!("Starting {} v{}", metadata.name, metadata.version);
    log::info!("  {}", metadata.description);
    for key in metadata.publishes {
        log::info!("  publishes: {}", key);
    }
    for key in metadata.consumes {
        log::info!("  consumes: {}", key);
    }

    let (_shutdown_tx, shutdown_rx) = setup_shutdown()?;

    let node = N::init(config).await?;
    log::info!("{} initialized. Press Ctrl+C to stop.", metadata.name);
    node.run(shutdown_rx).await?;

    log::info!("{} stopped", metadata.name);
    Ok(())
}
