//! Upstreams discovered from a container host.
//!
//! [`Upstreams::provision`] performs the bootstrap (ping, first listing,
//! first install) and then hands the store over to a background
//! [`DiscoveryWatcher`]. After that, discovery trouble is only ever
//! logged: [`UpstreamSource::get_upstreams`] cannot fail.

use std::convert::Infallible;
use std::sync::Arc;

use http::Request;
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::candidate::CandidateBuilder;
use crate::config::Config;
use crate::error::ProvisionError;
use crate::matchers::MatcherRegistry;
use crate::resolver::RequestResolver;
use crate::runtime::{ContainerHost, DockerHost};
use crate::store::{CandidateStore, Snapshot};
use crate::watcher::DiscoveryWatcher;

/// A backend to dial.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upstream {
    pub dial: String,
}

/// Supplies candidate upstreams for a request to a reverse proxy.
pub trait UpstreamSource {
    type Error;

    fn get_upstreams<B>(&self, req: &Request<B>) -> Result<Vec<Upstream>, Self::Error>;
}

pub struct Upstreams {
    store: Arc<CandidateStore>,
    resolver: RequestResolver,
    shutdown: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl Upstreams {
    /// Connect to the local Docker engine and provision with the built-in
    /// matchers.
    pub async fn connect(
        config: &Config,
        shutdown: &CancellationToken,
    ) -> Result<Self, ProvisionError> {
        let host = DockerHost::connect().map_err(ProvisionError::Connect)?;
        let registry = MatcherRegistry::with_defaults(&config.labels());
        Self::provision(Arc::new(host), config, registry, shutdown).await
    }

    /// Bootstrap discovery and start the background watcher. The watcher
    /// stops when `shutdown` (or [`Upstreams::shutdown`]) is cancelled.
    pub async fn provision(
        host: Arc<dyn ContainerHost>,
        config: &Config,
        registry: MatcherRegistry,
        shutdown: &CancellationToken,
    ) -> Result<Self, ProvisionError> {
        let api_version = host.ping().await.map_err(ProvisionError::Ping)?;
        info!("Docker engine is connected, api version {}", api_version);

        let builder = Arc::new(CandidateBuilder::new(config.labels(), registry));
        let containers = host
            .list_containers(&builder.labels().enable)
            .await
            .map_err(ProvisionError::List)?;
        let store = Arc::new(CandidateStore::new(builder.build(&containers)));
        info!(
            "Initial scan found {} upstream candidates",
            store.read_all().len()
        );

        let shutdown = shutdown.child_token();
        let watcher = DiscoveryWatcher::new(
            host,
            builder,
            Arc::clone(&store),
            config.reconnect_delay(),
        );
        let handle = tokio::spawn(watcher.run(shutdown.clone()));

        Ok(Self {
            resolver: RequestResolver::new(Arc::clone(&store)),
            store,
            shutdown,
            watcher: Some(handle),
        })
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.read_all()
    }

    pub fn store(&self) -> Arc<CandidateStore> {
        Arc::clone(&self.store)
    }

    /// Notified after every install performed by the watcher.
    pub fn subscribe_installs(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Stop the watcher and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.watcher.take() {
            let _ = handle.await;
        }
    }
}

impl UpstreamSource for Upstreams {
    type Error = Infallible;

    fn get_upstreams<B>(&self, req: &Request<B>) -> Result<Vec<Upstream>, Infallible> {
        Ok(self
            .resolver
            .resolve(req)
            .into_iter()
            .map(|dial| Upstream { dial })
            .collect())
    }
}

impl Drop for Upstreams {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Labels;
    use crate::runtime::fake::FakeHost;
    use crate::types::{ContainerRecord, HostEvent};
    use std::time::Duration;

    fn container(id: &str, enable: &str, ip: &str, port: &str) -> ContainerRecord {
        let labels = Labels::default();
        ContainerRecord::new(id)
            .with_label(&labels.enable, enable)
            .with_label(&labels.upstream_port, port)
            .with_network("bridge", ip)
    }

    async fn provision(host: Arc<FakeHost>) -> Result<Upstreams, ProvisionError> {
        let config = Config::default();
        let registry = MatcherRegistry::with_defaults(&config.labels());
        Upstreams::provision(host, &config, registry, &CancellationToken::new()).await
    }

    fn dials(upstreams: &Upstreams, req: &Request<()>) -> Vec<String> {
        upstreams
            .get_upstreams(req)
            .unwrap()
            .into_iter()
            .map(|u| u.dial)
            .collect()
    }

    #[tokio::test]
    async fn enabled_container_is_returned() {
        let host = Arc::new(FakeHost::new(vec![
            container("a", "true", "172.17.0.2", "80"),
            container("b", "false", "172.17.0.3", "80"),
        ]));
        let upstreams = provision(host).await.unwrap();

        let req = Request::get("/").body(()).unwrap();
        assert_eq!(dials(&upstreams, &req), ["172.17.0.2:80"]);

        upstreams.shutdown().await;
    }

    #[tokio::test]
    async fn label_matchers_filter_requests() {
        let labels = Labels::default();
        let host = Arc::new(FakeHost::new(vec![
            container("api", "true", "10.0.0.1", "8080")
                .with_label(labels.matcher("path"), "/api/*"),
            container("web", "true", "10.0.0.2", "80")
                .with_label(labels.matcher("host"), "www.example.com"),
        ]));
        let upstreams = provision(host).await.unwrap();

        let req = Request::get("http://www.example.com/api/v1").body(()).unwrap();
        assert_eq!(dials(&upstreams, &req), ["10.0.0.1:8080", "10.0.0.2:80"]);

        let req = Request::get("http://api.example.com/api/v1").body(()).unwrap();
        assert_eq!(dials(&upstreams, &req), ["10.0.0.1:8080"]);

        let req = Request::get("http://api.example.com/").body(()).unwrap();
        assert!(dials(&upstreams, &req).is_empty());

        upstreams.shutdown().await;
    }

    #[tokio::test]
    async fn bootstrap_failures_are_returned() {
        let host = Arc::new(FakeHost::new(vec![]));
        host.fail_ping();
        assert!(matches!(
            provision(host).await,
            Err(ProvisionError::Ping(_))
        ));

        let host = Arc::new(FakeHost::new(vec![]));
        host.fail_lists(1);
        assert!(matches!(
            provision(host.clone()).await,
            Err(ProvisionError::List(_))
        ));
        // No watcher was started.
        assert_eq!(host.subscribes(), 0);
    }

    #[tokio::test]
    async fn watcher_keeps_upstreams_current() {
        let host = Arc::new(FakeHost::new(vec![]));
        let events = host.subscription();
        let upstreams = provision(host.clone()).await.unwrap();
        let mut installs = upstreams.subscribe_installs();

        let req = Request::get("/").body(()).unwrap();
        assert!(dials(&upstreams, &req).is_empty());

        host.set_containers(vec![container("a", "true", "172.17.0.2", "80")]);
        events.send(Ok(HostEvent::new("start", "a"))).unwrap();
        tokio::time::timeout(Duration::from_secs(5), installs.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dials(&upstreams, &req), ["172.17.0.2:80"]);
        assert_eq!(upstreams.snapshot().len(), 1);

        upstreams.shutdown().await;
        assert!(events.send(Ok(HostEvent::new("stop", "a"))).is_err());
    }

    #[tokio::test]
    async fn parent_token_stops_watcher() {
        let host = Arc::new(FakeHost::new(vec![]));
        let events = host.subscription();
        let config = Config::default();
        let parent = CancellationToken::new();
        let upstreams = Upstreams::provision(
            host.clone(),
            &config,
            MatcherRegistry::new(),
            &parent,
        )
        .await
        .unwrap();

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !events.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        drop(upstreams);
    }
}
