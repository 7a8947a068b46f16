//! Data structures used throughout the discovery engine.
//!
//! These are the host-agnostic views of what a container host reports.
//! Runtimes convert their own wire models into these types so the rest of
//! the crate never depends on a particular client library.

use std::collections::{BTreeMap, HashMap};

/// A point-in-time view of one running container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub labels: HashMap<String, String>,
    /// Attachments keyed by network name. Ordered so that picking "the
    /// first" attachment is deterministic.
    pub networks: BTreeMap<String, NetworkAttachment>,
}

/// A container's attachment to a single network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub ip_address: String,
}

/// A container lifecycle event (start, die, ...).
///
/// The payload is only used for diagnostics; any event triggers a full
/// relist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    pub action: String,
    pub container_id: String,
}

impl ContainerRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_network(mut self, name: impl Into<String>, ip_address: impl Into<String>) -> Self {
        self.networks.insert(
            name.into(),
            NetworkAttachment {
                ip_address: ip_address.into(),
            },
        );
        self
    }
}

impl HostEvent {
    pub fn new(action: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            container_id: container_id.into(),
        }
    }
}
