//! Error types shared across the discovery engine.
//!
//! Only [`ProvisionError`] ever crosses the crate boundary as a returned
//! error. Everything else is logged where it happens and absorbed so that
//! request routing keeps serving the last good snapshot.

use thiserror::Error;

/// Failures reported by a [`ContainerHost`](crate::runtime::ContainerHost).
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
    #[error("event stream closed by the container host")]
    StreamClosed,
    /// The subscription was cancelled by its owner. A watcher receiving
    /// this stops for good instead of resubscribing. `DockerHost` ends its
    /// subscriptions by being dropped and never yields it; other hosts may
    /// use it to end a watch from their side.
    #[error("operation cancelled")]
    Cancelled,
}

/// Bootstrap failures. These abort provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("unable to connect to the container host: {0}")]
    Connect(#[source] HostError),
    #[error("container host is not reachable: {0}")]
    Ping(#[source] HostError),
    #[error("unable to get the initial list of containers: {0}")]
    List(#[source] HostError),
}

/// Reasons a single container does not become a candidate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("unable to get port from container labels: container {container_id} has no `{label}` label")]
    MissingPort { container_id: String, label: String },
    #[error("container {container_id} has an invalid upstream port {value:?}")]
    InvalidPort { container_id: String, value: String },
    #[error("unable to get ip address from container networks: container {container_id}")]
    NoNetwork { container_id: String },
}

/// A matcher could not be provisioned from its label value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatcherError {
    #[error("invalid matcher value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },
}

impl MatcherError {
    pub(crate) fn invalid(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
