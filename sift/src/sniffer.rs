//! Cluster membership discovery
//!
//! A sniff asks every candidate URL (seed URLs plus the URLs of nodes not
//! currently dead) for `/_nodes/http`, all at once. The first non-empty
//! answer wins and replaces the registry contents; with a quorum above one,
//! that many candidates must report the same set of node identifiers.
//! The whole fan-out is bounded by a single deadline.

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::metrics;
use crate::node::Node;
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Decides whether an advertised node may enter the registry
pub type SnifferFilter = Arc<dyn Fn(&NodeInfo) -> bool + Send + Sync>;

/// Body of `GET /_nodes/http`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodesInfoResponse {
    #[serde(default)]
    pub cluster_name: String,
    /// Nodes keyed by node identifier
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeInfo>,
}

/// One node as advertised by the cluster
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub transport_address: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    /// A plain string on recent versions, a list on old ones
    #[serde(default)]
    pub ip: Option<Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub http_address: Option<String>,
    #[serde(default)]
    pub https_address: Option<String>,
    #[serde(default)]
    pub http: Option<NodeHttpInfo>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeHttpInfo {
    #[serde(default)]
    pub bound_address: Vec<String>,
    #[serde(default)]
    pub publish_address: Option<String>,
    #[serde(default)]
    pub max_content_length_in_bytes: Option<u64>,
}

impl NodeInfo {
    /// URL under which this node accepts requests for `scheme`
    pub fn publish_url(&self, scheme: &str) -> Option<String> {
        let advertised = if scheme == "https" {
            self.https_address.as_deref()
        } else {
            self.http_address.as_deref()
        };
        let address = advertised.or_else(|| {
            self.http
                .as_ref()
                .and_then(|http| http.publish_address.as_deref())
        })?;
        extract_url(scheme, address)
    }
}

fn inet_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/([^:]*):([0-9]+)\]").ok())
        .as_ref()
}

/// Rebuild a URL from an advertised address.
///
/// `inet[/127.0.0.1:9200]` is matched against `/([^:]*):([0-9]+)]`; other
/// forms such as `localhost/127.0.0.1:9200` or `127.0.0.1:9200` use the
/// part after the last `/` and must carry a port.
pub fn extract_url(scheme: &str, address: &str) -> Option<String> {
    let host_port = if address.starts_with("inet") {
        let captures = inet_pattern()?.captures(address)?;
        format!("{}:{}", &captures[1], &captures[2])
    } else {
        let address = match address.rfind('/') {
            Some(idx) => &address[idx + 1..],
            None => address,
        };
        if !address.contains(':') {
            return None;
        }
        address.to_string()
    };
    Some(format!("{}://{}", scheme, host_port))
}

/// Turn a nodes-info answer into registry records, ordered by identifier
pub(crate) fn nodes_from_info(
    info: &NodesInfoResponse,
    scheme: &str,
    filter: Option<&SnifferFilter>,
) -> Vec<Node> {
    info.nodes
        .iter()
        .filter(|(_, node)| filter.map_or(true, |accept| accept(node)))
        .filter_map(|(id, node)| match node.publish_url(scheme) {
            Some(url) => Some(Node::new(id.clone(), url)),
            None => {
                debug!("Node {} advertises no usable {} address", id, scheme);
                None
            }
        })
        .collect()
}

fn same_members(a: &[Node], b: &[Node]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id == y.id)
}

/// Run one sniff and reconcile the registry with the winning answer
pub(crate) async fn sniff(inner: &ClientInner, timeout: Duration) -> Result<()> {
    let (scheme, quorum, mut candidates) = {
        let settings = inner.settings.read();
        (
            settings.config.scheme.clone(),
            settings.config.sniff_quorum.max(1),
            settings.seed_urls.clone(),
        )
    };
    for url in inner.registry.live_urls() {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    }
    if candidates.is_empty() {
        return Err(Error::NoClient("no URL to sniff".into()));
    }

    debug!(candidates = candidates.len(), quorum, "Sniffing cluster");

    let mut pending: FuturesUnordered<_> = candidates
        .iter()
        .map(|url| sniff_node(inner, url, &scheme))
        .collect();

    let agreement = async {
        let mut answers: Vec<Vec<Node>> = Vec::new();
        while let Some(nodes) = pending.next().await {
            if nodes.is_empty() {
                continue;
            }
            let agreeing = 1 + answers.iter().filter(|a| same_members(a, &nodes)).count();
            if agreeing >= quorum {
                return Some(nodes);
            }
            answers.push(nodes);
        }
        None
    };

    match tokio::time::timeout(timeout, agreement).await {
        Ok(Some(nodes)) => {
            let count = nodes.len();
            let change = inner.registry.replace(nodes);
            debug!(
                nodes = count,
                joined = change.joined.len(),
                left = change.left.len(),
                "Sniff complete"
            );
            metrics::record_sniff("ok", count);
            Ok(())
        }
        Ok(None) => {
            metrics::record_sniff("empty", 0);
            error!("Sniffing found no nodes among {} candidates", candidates.len());
            Err(Error::NoClient("no node returned cluster membership".into()))
        }
        Err(_) => {
            metrics::record_sniff("timeout", 0);
            error!("Sniffing timed out after {}ms", timeout.as_millis());
            Err(Error::NoClient("sniff timeout".into()))
        }
    }
}

/// Ask one candidate for the membership; any failure yields no nodes
async fn sniff_node(inner: &ClientInner, url: &str, scheme: &str) -> Vec<Node> {
    let request = inner.http_request(Method::GET, format!("{}/_nodes/http", url));

    let response = match inner.transport.send(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!("Sniffing {} failed: {}", url, e);
            return Vec::new();
        }
    };
    if !response.is_success() {
        debug!("Sniffing {} returned status {}", url, response.status);
        return Vec::new();
    }
    trace!(url, body = %String::from_utf8_lossy(&response.body), "Nodes info");

    let info = inner
        .decoder
        .decode(&response.body)
        .and_then(|value| Ok(serde_json::from_value::<NodesInfoResponse>(value)?));
    match info {
        Ok(info) => nodes_from_info(&info, scheme, inner.sniffer_filter.as_ref()),
        Err(e) => {
            debug!("Invalid nodes info from {}: {}", url, e);
            Vec::new()
        }
    }
}
