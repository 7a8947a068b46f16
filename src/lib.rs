//! Reverse-proxy upstreams discovered from running containers.
//!
//! Containers opt in with `<namespace>.enable=true` and name their port
//! with `<namespace>.upstream.port`. Optional `<namespace>.matchers.*`
//! labels restrict which requests a container is offered for. A background
//! watcher keeps the candidate set in sync with container lifecycle events,
//! while [`Upstreams::get_upstreams`](UpstreamSource::get_upstreams)
//! filters the current snapshot for each request without blocking.

pub mod candidate;
pub mod config;
pub mod error;
pub mod matchers;
pub mod resolver;
pub mod runtime;
pub mod store;
pub mod types;
pub mod upstreams;
pub mod watcher;

pub use candidate::{Candidate, CandidateBuilder};
pub use config::{Config, Labels};
pub use error::{CandidateError, HostError, MatcherError, ProvisionError};
pub use matchers::{Matcher, MatcherRegistry, RemoteAddr, RequestHead, Tls};
pub use resolver::RequestResolver;
pub use runtime::{ContainerHost, DockerHost};
pub use store::{CandidateStore, Snapshot};
pub use upstreams::{Upstream, UpstreamSource, Upstreams};
pub use watcher::DiscoveryWatcher;
