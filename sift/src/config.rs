//! Client configuration
//!
//! Can be built in code or loaded from TOML:
//!
//! ```toml
//! urls = ["http://10.0.0.1:9200", "http://10.0.0.2:9200"]
//! sniff_enabled = true
//! sniffer_interval_ms = 900000
//! healthcheck_interval_ms = 60000
//! max_retries = 3
//! ```

use crate::canonical::canonicalize;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default endpoint on the local machine
pub const DEFAULT_URL: &str = "http://127.0.0.1:9200";

/// Main client configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    /// Seed URLs; also the initial registry when sniffing is off
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,

    /// Scheme used for URLs discovered while sniffing (http or https)
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Discover cluster membership through the node-info endpoint
    #[serde(default = "default_true")]
    pub sniff_enabled: bool,

    /// Interval between two sniffs in milliseconds
    #[serde(default = "default_sniffer_interval")]
    pub sniffer_interval_ms: u64,

    /// Whole-sniff deadline in milliseconds
    #[serde(default = "default_sniffer_timeout")]
    pub sniffer_timeout_ms: u64,

    /// Deadline for the sniff run during construction
    #[serde(default = "default_startup_timeout")]
    pub sniffer_timeout_startup_ms: u64,

    /// Number of candidates that must agree on the membership
    #[serde(default = "default_sniff_quorum")]
    pub sniff_quorum: usize,

    /// Probe registered nodes periodically
    #[serde(default = "default_true")]
    pub healthcheck_enabled: bool,

    /// Interval between two health checks in milliseconds
    #[serde(default = "default_healthcheck_interval")]
    pub healthcheck_interval_ms: u64,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_healthcheck_timeout")]
    pub healthcheck_timeout_ms: u64,

    /// Per-probe timeout for the checks run during construction
    #[serde(default = "default_startup_timeout")]
    pub healthcheck_timeout_startup_ms: u64,

    /// Retries after the first attempt of a request
    #[serde(default)]
    pub max_retries: u32,

    /// HTTP statuses that are retried on another node instead of failing
    #[serde(default)]
    pub retry_statuses: Vec<u16>,

    /// First backoff wait in milliseconds (jittered by +/-10ms)
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    /// Ceiling for the doubling backoff in milliseconds
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Method used for GET requests that carry a body (GET or POST)
    #[serde(default = "default_send_get_body_as")]
    pub send_get_body_as: String,

    /// Compress request bodies with gzip
    #[serde(default)]
    pub gzip: bool,

    /// Plugins the cluster must have installed; checked during construction
    #[serde(default)]
    pub required_plugins: Vec<String>,
}

fn default_urls() -> Vec<String> {
    vec![DEFAULT_URL.to_string()]
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sniffer_interval() -> u64 {
    15 * 60 * 1000
}

fn default_sniffer_timeout() -> u64 {
    1000
}

fn default_startup_timeout() -> u64 {
    5000
}

fn default_sniff_quorum() -> usize {
    1
}

fn default_healthcheck_interval() -> u64 {
    60 * 1000
}

fn default_healthcheck_timeout() -> u64 {
    1000
}

fn default_backoff_initial() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    30 * 1000
}

fn default_send_get_body_as() -> String {
    "GET".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            scheme: default_scheme(),
            sniff_enabled: true,
            sniffer_interval_ms: default_sniffer_interval(),
            sniffer_timeout_ms: default_sniffer_timeout(),
            sniffer_timeout_startup_ms: default_startup_timeout(),
            sniff_quorum: default_sniff_quorum(),
            healthcheck_enabled: true,
            healthcheck_interval_ms: default_healthcheck_interval(),
            healthcheck_timeout_ms: default_healthcheck_timeout(),
            healthcheck_timeout_startup_ms: default_startup_timeout(),
            max_retries: 0,
            retry_statuses: Vec::new(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            send_get_body_as: default_send_get_body_as(),
            gzip: false,
            required_plugins: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Configuration with the given seed URLs and all other defaults
    pub fn with_urls<S: Into<String>>(urls: impl IntoIterator<Item = S>) -> Self {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        Self {
            urls: if urls.is_empty() { default_urls() } else { urls },
            ..Self::default()
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Canonical seed URLs; falls back to the default URL when none is set
    pub fn canonical_urls(&self) -> Vec<String> {
        if self.urls.is_empty() {
            return canonicalize(&default_urls());
        }
        canonicalize(&self.urls)
    }

    /// Check option values, failing fast on the first invalid one
    pub fn validate(&self) -> Result<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(Error::Config(format!(
                "scheme must be http or https, got '{}'",
                self.scheme
            )));
        }
        if self.canonical_urls().is_empty() {
            return Err(Error::Config(format!("no valid URL in {:?}", self.urls)));
        }
        for (name, value) in [
            ("sniffer_interval_ms", self.sniffer_interval_ms),
            ("sniffer_timeout_ms", self.sniffer_timeout_ms),
            ("sniffer_timeout_startup_ms", self.sniffer_timeout_startup_ms),
            ("healthcheck_interval_ms", self.healthcheck_interval_ms),
            ("healthcheck_timeout_ms", self.healthcheck_timeout_ms),
            ("healthcheck_timeout_startup_ms", self.healthcheck_timeout_startup_ms),
            ("backoff_max_ms", self.backoff_max_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.sniff_quorum == 0 {
            return Err(Error::Config("sniff_quorum must be at least 1".into()));
        }
        match self.send_get_body_as.as_str() {
            "GET" | "POST" => {}
            other => {
                return Err(Error::Config(format!(
                    "send_get_body_as must be GET or POST, got '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    pub fn sniffer_interval(&self) -> Duration {
        Duration::from_millis(self.sniffer_interval_ms)
    }

    pub fn sniffer_timeout(&self) -> Duration {
        Duration::from_millis(self.sniffer_timeout_ms)
    }

    pub fn sniffer_timeout_startup(&self) -> Duration {
        Duration::from_millis(self.sniffer_timeout_startup_ms)
    }

    pub fn healthcheck_interval(&self) -> Duration {
        Duration::from_millis(self.healthcheck_interval_ms)
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_millis(self.healthcheck_timeout_ms)
    }

    pub fn healthcheck_timeout_startup(&self) -> Duration {
        Duration::from_millis(self.healthcheck_timeout_startup_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}
