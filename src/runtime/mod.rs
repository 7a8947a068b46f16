use crate::error::HostError;
use crate::types::{ContainerRecord, HostEvent};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod docker;
pub use docker::DockerHost;

#[cfg(test)]
pub(crate) mod fake;

/// Stream of container lifecycle events from a single subscription.
pub type EventStream = BoxStream<'static, Result<HostEvent, HostError>>;

#[async_trait]
pub trait ContainerHost: Send + Sync {
    /// Verify the host is reachable and return its API version.
    async fn ping(&self) -> Result<String, HostError>;

    /// List running containers that carry the `label` key.
    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerRecord>, HostError>;

    /// Subscribe to container lifecycle events.
    /// Only container events are delivered; the subscription ends when the
    /// returned stream is dropped. Yielding [`HostError::Cancelled`] stops
    /// the watcher permanently, any other error makes it resubscribe.
    fn events(&self) -> EventStream;
}
