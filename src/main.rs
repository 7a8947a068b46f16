//! docker-upstreams daemon entry point.
//!
//! Bootstraps discovery against the local Docker engine and logs every
//! snapshot the watcher installs until Ctrl+C.

use docker_upstreams::{Candidate, Config, Upstreams};
use log::{error, info};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting docker-upstreams with config: {:?}", cfg);

    let shutdown = CancellationToken::new();
    let upstreams = Upstreams::connect(&cfg, &shutdown).await?;

    // Snapshot reporter
    let store = upstreams.store();
    let mut installs = upstreams.subscribe_installs();
    let reporter_handle = tokio::spawn(async move {
        while installs.changed().await.is_ok() {
            let snapshot = store.read_all();
            let dials = snapshot.iter().map(Candidate::dial).collect::<Vec<_>>();
            info!("Upstreams: {:?}", dials);
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    shutdown.cancel();
    upstreams.shutdown().await;
    reporter_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
