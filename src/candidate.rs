//! Turning container records into routable candidates.
//!
//! [`CandidateBuilder::build`] is a pure function of its input: it reads
//! labels and network attachments, logs what it cannot use, and returns
//! the candidates in listing order. It never touches shared state.

use log::error;

use crate::config::Labels;
use crate::error::CandidateError;
use crate::matchers::{MatchSet, MatcherRegistry, RequestHead};
use crate::types::ContainerRecord;

/// A backend derived from one container.
#[derive(Debug)]
pub struct Candidate {
    matchers: MatchSet,
    dial: String,
}

impl Candidate {
    pub fn new(matchers: MatchSet, dial: impl Into<String>) -> Self {
        Self {
            matchers,
            dial: dial.into(),
        }
    }

    /// The `host:port` to connect to.
    pub fn dial(&self) -> &str {
        &self.dial
    }

    pub fn matchers(&self) -> &MatchSet {
        &self.matchers
    }

    pub fn matches(&self, req: &RequestHead<'_>) -> bool {
        self.matchers.matches(req)
    }
}

#[derive(Debug, Clone)]
pub struct CandidateBuilder {
    labels: Labels,
    registry: MatcherRegistry,
}

impl CandidateBuilder {
    pub fn new(labels: Labels, registry: MatcherRegistry) -> Self {
        Self { labels, registry }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn build(&self, containers: &[ContainerRecord]) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(containers.len());

        for container in containers {
            match self.build_one(container) {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(err) => error!("{}", err),
            }
        }

        candidates
    }

    /// `Ok(None)` when the container is not enabled.
    fn build_one(&self, container: &ContainerRecord) -> Result<Option<Candidate>, CandidateError> {
        if container.labels.get(&self.labels.enable).map(String::as_str) != Some("true") {
            return Ok(None);
        }

        let matchers = self.build_matchers(container);

        let port = container
            .labels
            .get(&self.labels.upstream_port)
            .ok_or_else(|| CandidateError::MissingPort {
                container_id: container.id.clone(),
                label: self.labels.upstream_port.clone(),
            })?;
        let port = parse_port(port).ok_or_else(|| CandidateError::InvalidPort {
            container_id: container.id.clone(),
            value: port.clone(),
        })?;

        let ip = select_address(container).ok_or_else(|| CandidateError::NoNetwork {
            container_id: container.id.clone(),
        })?;

        Ok(Some(Candidate::new(matchers, join_host_port(ip, port))))
    }

    fn build_matchers(&self, container: &ContainerRecord) -> MatchSet {
        let mut matchers = MatchSet::default();

        for (key, producer) in self.registry.iter() {
            let Some(value) = container.labels.get(key) else {
                continue;
            };

            let mut matcher = producer(value);
            if let Err(err) = matcher.provision() {
                error!(
                    "unable to provision matcher for container {}: {}={}: {}",
                    container.id, key, value, err
                );
                continue;
            }
            matchers.push(matcher);
        }

        matchers
    }
}

fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

/// IP of the first network attachment (by network name) that has one.
fn select_address(container: &ContainerRecord) -> Option<&str> {
    container
        .networks
        .values()
        .map(|n| n.ip_address.trim())
        .find(|ip| !ip.is_empty())
}

/// Joins a host and port into `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
