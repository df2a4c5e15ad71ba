//! Client construction

use super::{Client, ClientInner, Settings};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::health::{healthcheck, startup_healthcheck};
use crate::registry::{NodeRegistry, NodeSelector, RoundRobin};
use crate::response::{Decoder, JsonDecoder};
use crate::retrier::Retrier;
use crate::sniffer::{sniff, NodeInfo, SnifferFilter};
use crate::transport::{ReqwestTransport, Transport};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// `sift/<version> (<os>-<arch>)`
pub fn user_agent() -> String {
    format!(
        "sift/{} ({}-{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for [`Client`]
///
/// Serializable options live in [`ClientConfig`]; collaborators that cannot
/// come from a file (transport, decoder, selection policy, sniffer filter,
/// retry policy) are set here.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    retrier: Option<Arc<dyn Retrier>>,
    decoder: Option<Arc<dyn Decoder>>,
    selector: Option<Box<dyn NodeSelector>>,
    sniffer_filter: Option<SnifferFilter>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            retrier: None,
            decoder: None,
            selector: None,
            sniffer_filter: None,
        }
    }

    /// Replace all serializable options at once
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn urls<S: Into<String>>(mut self, urls: impl IntoIterator<Item = S>) -> Self {
        self.config.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Retry policy; defaults to a backoff retrier honouring `max_retries`
    pub fn retrier(mut self, retrier: impl Retrier + 'static) -> Self {
        self.retrier = Some(Arc::new(retrier));
        self
    }

    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Node selection policy; round-robin by default
    pub fn selector(mut self, selector: impl NodeSelector + 'static) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    /// Exclude advertised nodes from the registry when sniffing
    pub fn sniffer_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&NodeInfo) -> bool + Send + Sync + 'static,
    {
        self.sniffer_filter = Some(Arc::new(filter));
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.config.scheme = scheme.into();
        self
    }

    pub fn sniff(mut self, enabled: bool) -> Self {
        self.config.sniff_enabled = enabled;
        self
    }

    pub fn sniffer_interval(mut self, interval: Duration) -> Self {
        self.config.sniffer_interval_ms = millis(interval);
        self
    }

    pub fn sniffer_timeout(mut self, timeout: Duration) -> Self {
        self.config.sniffer_timeout_ms = millis(timeout);
        self
    }

    pub fn sniffer_timeout_startup(mut self, timeout: Duration) -> Self {
        self.config.sniffer_timeout_startup_ms = millis(timeout);
        self
    }

    pub fn sniff_quorum(mut self, quorum: usize) -> Self {
        self.config.sniff_quorum = quorum;
        self
    }

    pub fn healthcheck(mut self, enabled: bool) -> Self {
        self.config.healthcheck_enabled = enabled;
        self
    }

    pub fn healthcheck_interval(mut self, interval: Duration) -> Self {
        self.config.healthcheck_interval_ms = millis(interval);
        self
    }

    pub fn healthcheck_timeout(mut self, timeout: Duration) -> Self {
        self.config.healthcheck_timeout_ms = millis(timeout);
        self
    }

    pub fn healthcheck_timeout_startup(mut self, timeout: Duration) -> Self {
        self.config.healthcheck_timeout_startup_ms = millis(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Statuses retried on another node instead of failing the request
    pub fn retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.config.retry_statuses = statuses.into_iter().collect();
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.backoff_initial_ms = millis(initial);
        self.config.backoff_max_ms = millis(max);
        self
    }

    /// Method for GET requests carrying a body ("GET" or "POST")
    pub fn send_get_body_as(mut self, method: impl Into<String>) -> Self {
        self.config.send_get_body_as = method.into();
        self
    }

    /// Compress request bodies with gzip
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.config.gzip = enabled;
        self
    }

    /// Plugins that must be installed in the cluster for [`build`](Self::build)
    /// to succeed
    pub fn required_plugins<S: Into<String>>(
        mut self,
        plugins: impl IntoIterator<Item = S>,
    ) -> Self {
        self.config
            .required_plugins
            .extend(plugins.into_iter().map(Into::into));
        self
    }

    /// Validate options and assemble the shared state without any I/O
    pub(crate) fn prepare(self) -> Result<Arc<ClientInner>> {
        self.config.validate()?;
        let seed_urls = self.config.canonical_urls();

        let mut default_headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&user_agent())
            .map_err(|e| Error::Config(format!("invalid user agent: {}", e)))?;
        default_headers.insert(USER_AGENT, agent);
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let registry = match self.selector {
            Some(selector) => NodeRegistry::new(selector),
            None => NodeRegistry::new(Box::<RoundRobin>::default()),
        };

        debug!(urls = ?seed_urls, "Preparing client");

        Ok(Arc::new(ClientInner {
            settings: RwLock::new(Settings {
                config: self.config,
                seed_urls,
                running: false,
            }),
            registry,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            retrier: self.retrier,
            decoder: self.decoder.unwrap_or_else(|| Arc::new(JsonDecoder)),
            sniffer_filter: self.sniffer_filter,
            default_headers,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Build the client.
    ///
    /// Waits for a seed URL to answer (health checks on), discovers the
    /// cluster (sniffing on) or registers the seed URLs (sniffing off),
    /// probes the registry, requires one alive node and the configured
    /// plugins, and finally starts the background activities.
    pub async fn build(self) -> Result<Client> {
        let inner = self.prepare()?;
        let config = inner.settings.read().config.clone();

        if config.healthcheck_enabled {
            startup_healthcheck(&inner, config.healthcheck_timeout_startup()).await?;
        }

        if config.sniff_enabled {
            sniff(&inner, config.sniffer_timeout_startup()).await?;
        } else {
            inner.seed_registry();
        }

        if config.healthcheck_enabled {
            healthcheck(&inner, config.healthcheck_timeout_startup(), true).await;
        }

        if !inner.registry.has_alive() {
            return Err(Error::NoClient("no active connection found".into()));
        }

        let client = Client { inner };
        client.check_required_plugins().await?;
        client.start();
        Ok(client)
    }

    /// Build a client without sniffing, health checks or background
    /// activities; see [`Client::simple`]
    pub fn build_simple(mut self) -> Result<Client> {
        self.config.sniff_enabled = false;
        self.config.healthcheck_enabled = false;

        let inner = self.prepare()?;
        inner.seed_registry();

        let client = Client { inner };
        // Nothing to spawn, so no runtime is needed
        client.start();
        Ok(client)
    }
}
