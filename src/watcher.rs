//! Keeps the candidate store converged with the container host.
//!
//! The watcher subscribes to container lifecycle events and, for every
//! event received, relists the enabled containers, rebuilds the snapshot
//! and installs it. Events are handled one at a time; there is no
//! debouncing. A failed relist keeps the previous snapshot. A failed
//! subscription is torn down and re-established after a fixed delay. Only
//! cancellation stops the watcher.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::candidate::CandidateBuilder;
use crate::error::HostError;
use crate::runtime::ContainerHost;
use crate::store::CandidateStore;

/// How a single subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Transport failure; subscribe again after the delay.
    Faulted,
    /// Shutdown was requested.
    Terminated,
}

pub struct DiscoveryWatcher {
    host: Arc<dyn ContainerHost>,
    builder: Arc<CandidateBuilder>,
    store: Arc<CandidateStore>,
    reconnect_delay: Duration,
}

impl DiscoveryWatcher {
    pub fn new(
        host: Arc<dyn ContainerHost>,
        builder: Arc<CandidateBuilder>,
        store: Arc<CandidateStore>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            host,
            builder,
            store,
            reconnect_delay,
        }
    }

    /// List containers, rebuild and install a new snapshot. Returns the
    /// number of installed candidates. On error nothing is installed.
    pub async fn refresh(&self) -> Result<usize, HostError> {
        let containers = self
            .host
            .list_containers(&self.builder.labels().enable)
            .await?;
        let candidates = self.builder.build(&containers);
        let count = candidates.len();

        self.store.replace(candidates);
        Ok(count)
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Listening for container events...");

        loop {
            if self.watch(&shutdown).await == Exit::Terminated {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("Container event watcher stopped");
    }

    async fn watch(&self, shutdown: &CancellationToken) -> Exit {
        let mut events = self.host.events();

        loop {
            let next = tokio::select! {
                biased;

                _ = shutdown.cancelled() => return Exit::Terminated,
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    debug!("Container event: {} for {}", event.action, event.container_id);

                    tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => return Exit::Terminated,
                        result = self.refresh() => match result {
                            Ok(count) => info!("Installed {} upstream candidates", count),
                            Err(err) => error!("unable to get the list of containers: {}", err),
                        },
                    }
                }
                Some(Err(HostError::Cancelled)) => return Exit::Terminated,
                Some(Err(err)) => {
                    warn!("unable to monitor container events; will retry: {}", err);
                    return Exit::Faulted;
                }
                None => {
                    warn!(
                        "unable to monitor container events; will retry: {}",
                        HostError::StreamClosed
                    );
                    return Exit::Faulted;
                }
            }
        }
    }
}
