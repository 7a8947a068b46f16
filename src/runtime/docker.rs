use super::{ContainerHost, EventStream};
use crate::error::HostError;
use crate::types::{ContainerRecord, HostEvent, NetworkAttachment};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EndpointSettings, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;

pub struct DockerHost {
    docker: Docker,
}

impl DockerHost {
    /// Connect to the local Docker daemon using default settings.
    /// This handles the unix socket on Linux and `DOCKER_HOST`.
    pub fn connect() -> Result<Self, HostError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerHost for DockerHost {
    async fn ping(&self) -> Result<String, HostError> {
        self.docker.ping().await?;
        let version = self.docker.version().await?;
        Ok(version.api_version.unwrap_or_default())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<ContainerRecord>, HostError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            filters: HashMap::from([("label".to_string(), vec![label.to_string()])]),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        Ok(containers.into_iter().map(to_record).collect())
    }

    fn events(&self) -> EventStream {
        let opts = EventsOptions::<String> {
            filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
            ..Default::default()
        };

        self.docker
            .events(Some(opts))
            .map(|msg| msg.map(to_event).map_err(HostError::from))
            .boxed()
    }
}

fn to_record(summary: ContainerSummary) -> ContainerRecord {
    let networks = summary
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, settings)| {
            let attachment = NetworkAttachment {
                ip_address: endpoint_ip(settings),
            };
            (name, attachment)
        })
        .collect();

    ContainerRecord {
        id: summary.id.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        networks,
    }
}

/// IPv4 address of an endpoint, or its global IPv6 address on IPv6-only
/// networks.
fn endpoint_ip(settings: EndpointSettings) -> String {
    settings
        .ip_address
        .filter(|ip| !ip.is_empty())
        .or(settings.global_ipv6_address)
        .unwrap_or_default()
}

fn to_event(event: EventMessage) -> HostEvent {
    HostEvent {
        action: event.action.unwrap_or_default(),
        container_id: event.actor.and_then(|a| a.id).unwrap_or_default(),
    }
}
