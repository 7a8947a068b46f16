use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Label namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "com.caddyserver.http";

/// Delay before re-subscribing to host events after a transport error.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub label_namespace: String,
    pub reconnect_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label_namespace: DEFAULT_NAMESPACE.into(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl Config {
    /// Layered sources, lowest precedence first.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("docker-upstreams.toml"))
            .merge(Json::file("docker-upstreams.json"))
            .merge(Env::prefixed("DOCKER_UPSTREAMS_"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Self::figment()
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let namespace = config.label_namespace.trim();
        if namespace.is_empty() || namespace.ends_with('.') {
            return Err(anyhow::anyhow!(
                "Invalid label_namespace: {:?}",
                config.label_namespace
            ));
        }

        Ok(Self {
            label_namespace: namespace.to_string(),
            ..config
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn labels(&self) -> Labels {
        Labels::new(&self.label_namespace)
    }
}

/// Container label keys recognised under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    namespace: String,
    /// Must be exactly `"true"` for a container to be routable.
    pub enable: String,
    /// Port the upstream listens on inside its network.
    pub upstream_port: String,
}

impl Labels {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            enable: format!("{namespace}.enable"),
            upstream_port: format!("{namespace}.upstream.port"),
        }
    }

    /// Key of the label feeding the matcher called `name`.
    pub fn matcher(&self, name: &str) -> String {
        format!("{}.matchers.{}", self.namespace, name)
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
