//! Cluster-aware client
//!
//! [`Client`] is a cheap, clonable handle. All clones share one registry,
//! one transport and one set of background activities:
//!
//! - the sniffer, which periodically reconciles cluster membership
//! - the health checker, which periodically probes node liveness
//!
//! The registry has its own lock. Settings (configuration, seed URLs,
//! running flag) live behind a separate lock so background activities never
//! contend with requests picking nodes.

mod builder;
mod dispatch;

pub use builder::ClientBuilder;
pub use dispatch::PerformRequest;

use crate::background::BackgroundTask;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::health::healthcheck;
use crate::node::Node;
use crate::registry::NodeRegistry;
use crate::response::Decoder;
use crate::retrier::Retrier;
use crate::sniffer::{sniff, SnifferFilter};
use crate::transport::{HttpRequest, Transport};
use parking_lot::{Mutex, RwLock};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Mutable client-wide state
pub(crate) struct Settings {
    pub(crate) config: ClientConfig,
    /// Canonicalized seed URLs
    pub(crate) seed_urls: Vec<String>,
    pub(crate) running: bool,
}

/// State shared by every clone of a [`Client`] and its background tasks
pub(crate) struct ClientInner {
    pub(crate) settings: RwLock<Settings>,
    pub(crate) registry: NodeRegistry,
    pub(crate) transport: Arc<dyn Transport>,
    /// Explicit retry policy; `None` derives one from the configuration
    pub(crate) retrier: Option<Arc<dyn Retrier>>,
    pub(crate) decoder: Arc<dyn Decoder>,
    pub(crate) sniffer_filter: Option<SnifferFilter>,
    pub(crate) default_headers: HeaderMap,
    tasks: Mutex<Vec<BackgroundTask>>,
}

impl ClientInner {
    /// Request carrying the client's identity headers
    pub(crate) fn http_request(&self, method: Method, url: String) -> HttpRequest {
        let mut request = HttpRequest::new(method, url);
        request.headers = self.default_headers.clone();
        request
    }

    /// Next alive node.
    ///
    /// With sniffing off an all-dead registry is revived, so later attempts
    /// have candidates again. The failing call still returns `NoClient`.
    pub(crate) fn next_node(&self) -> Result<Node> {
        let result = self.registry.next();
        if result.is_err() && !self.settings.read().config.sniff_enabled {
            self.registry.resurrect_all();
        }
        result
    }

    /// One record per seed URL, identified by the URL itself
    pub(crate) fn seed_registry(&self) {
        let seeds = self.settings.read().seed_urls.clone();
        self.registry
            .replace(seeds.into_iter().map(Node::from_url).collect());
    }
}

/// Handle to a cluster
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from configuration, sniffing and health checking as
    /// configured, and start its background activities
    pub async fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new().config(config).build().await
    }

    /// Client for short-lived use: no sniffing, no health checks, no
    /// background activities. The registry holds the configured URLs.
    pub fn simple(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new().config(config).build_simple()
    }

    /// Start the background activities. Does nothing if already running.
    pub fn start(&self) {
        let mut settings = self.inner.settings.write();
        if settings.running {
            return;
        }

        let mut tasks = Vec::new();
        if settings.config.sniff_enabled {
            tasks.push(BackgroundTask::spawn(
                "sniffer",
                settings.config.sniffer_interval(),
                Arc::downgrade(&self.inner),
                |inner: Arc<ClientInner>| async move {
                    let timeout = inner.settings.read().config.sniffer_timeout();
                    if let Err(e) = sniff(&inner, timeout).await {
                        error!("Sniffing failed: {}", e);
                    }
                },
            ));
        }
        if settings.config.healthcheck_enabled {
            tasks.push(BackgroundTask::spawn(
                "healthcheck",
                settings.config.healthcheck_interval(),
                Arc::downgrade(&self.inner),
                |inner: Arc<ClientInner>| async move {
                    let timeout = inner.settings.read().config.healthcheck_timeout();
                    healthcheck(&inner, timeout, false).await;
                },
            ));
        }

        self.inner.tasks.lock().extend(tasks);
        settings.running = true;
        info!("Client started with {} node(s)", self.inner.registry.len());
    }

    /// Stop the background activities and wait until each acknowledged.
    ///
    /// Returns false if an activity had already exited without answering.
    /// Does nothing if the client is not running.
    pub async fn stop(&self) -> bool {
        {
            let mut settings = self.inner.settings.write();
            if !settings.running {
                return true;
            }
            settings.running = false;
        }

        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        let mut acknowledged = true;
        for task in tasks {
            let name = task.name();
            if !task.stop().await {
                warn!("{} did not acknowledge stop", name);
                acknowledged = false;
            }
        }
        info!("Client stopped");
        acknowledged
    }

    pub fn is_running(&self) -> bool {
        self.inner.settings.read().running
    }

    /// Snapshot of the registry in selection order
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.registry.nodes()
    }

    /// Current configuration
    pub fn config(&self) -> ClientConfig {
        self.inner.settings.read().config.clone()
    }

    /// Sniff immediately with the configured sniff timeout
    pub async fn sniff_now(&self) -> Result<()> {
        let timeout = self.inner.settings.read().config.sniffer_timeout();
        sniff(&self.inner, timeout).await
    }

    /// Probe every node immediately, even when periodic checks are disabled
    pub async fn healthcheck_now(&self) {
        let timeout = self.inner.settings.read().config.healthcheck_timeout();
        healthcheck(&self.inner, timeout, true).await;
    }

    /// Fail with a configuration error naming the first required plugin
    /// that no node has installed
    pub async fn check_required_plugins(&self) -> Result<()> {
        let required = self.inner.settings.read().config.required_plugins.clone();
        if required.is_empty() {
            return Ok(());
        }
        let installed = self.plugins().await?;
        for plugin in &required {
            if !installed.contains(plugin) {
                error!("Required plugin {} is not installed", plugin);
                return Err(Error::Config(format!("plugin {} not found", plugin)));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.inner.registry.nodes();
        if nodes.is_empty() {
            return write!(f, "no nodes");
        }
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("nodes", &self.inner.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}
