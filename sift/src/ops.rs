//! Document, index and cluster operations
//!
//! Each operation is a single request through [`Client::execute`] with the
//! path the server expects. Request bodies are passed through as given.

use crate::classify::{classify, Classification};
use crate::client::{Client, PerformRequest};
use crate::error::{ProtocolError, Result};
use crate::response::{Body, Response};
use crate::search::SearchResult;
use crate::sniffer::NodesInfoResponse;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Answer of `GET /`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PingResult {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub version: PingVersion,
    #[serde(default)]
    pub tagline: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PingVersion {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub build_hash: String,
    #[serde(default)]
    pub lucene_version: String,
}

/// Answer of single-document writes and reads
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocumentResult {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl DocumentResult {
    pub fn is_found(&self) -> bool {
        self.found.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct AcknowledgedResponse {
    #[serde(default)]
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ShardsInfo {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub successful: u32,
    #[serde(default)]
    pub failed: u32,
}

/// Answer of `_refresh` and `_flush`
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct BroadcastResponse {
    #[serde(rename = "_shards", default)]
    pub shards: ShardsInfo,
}

/// One step of an alias update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        AliasAction::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        AliasAction::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// Cluster health color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    #[default]
    Red,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer of `GET /_cluster/health`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub number_of_nodes: u32,
    #[serde(default)]
    pub number_of_data_nodes: u32,
    #[serde(default)]
    pub active_primary_shards: u32,
    #[serde(default)]
    pub active_shards: u32,
    #[serde(default)]
    pub relocating_shards: u32,
    #[serde(default)]
    pub initializing_shards: u32,
    #[serde(default)]
    pub unassigned_shards: u32,
}

fn indices_prefix(indices: &[&str]) -> String {
    if indices.is_empty() {
        String::new()
    } else {
        format!("/{}", indices.join(","))
    }
}

/// Answer of `/_nodes/plugins`
#[derive(Debug, Clone, Deserialize)]
pub struct NodesPluginsResponse {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodePlugins>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodePlugins {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plugins: Vec<PluginInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Client {
    /// Ask a specific URL, bypassing the registry, for its identity
    pub async fn ping(&self, url: &str) -> Result<(PingResult, u16)> {
        let request = self
            .inner
            .http_request(Method::GET, format!("{}/", url.trim_end_matches('/')));
        let response = self.inner.transport.send(request).await?;
        match classify(&response, &[], &[]) {
            Classification::Success => {}
            Classification::Retry(err) | Classification::Fatal(err) => return Err(err),
        }
        let status = response.status;
        let response = Response::new(
            status,
            response.headers,
            response.body,
            self.inner.decoder.clone(),
        );
        Ok((response.decode()?, status))
    }

    /// Version number reported by a specific URL
    pub async fn server_version(&self, url: &str) -> Result<String> {
        let (ping, _) = self.ping(url).await?;
        Ok(ping.version.number)
    }

    /// Index a document; the server assigns an id when `id` is `None`
    pub async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: Option<&str>,
        doc: impl Into<Body>,
    ) -> Result<DocumentResult> {
        let request = match id {
            Some(id) => PerformRequest::new(Method::PUT, format!("/{}/{}/{}", index, doc_type, id)),
            None => PerformRequest::new(Method::POST, format!("/{}/{}", index, doc_type)),
        };
        self.execute(request.body(doc)).await?.decode()
    }

    /// Fetch a document; a missing one comes back with `found == false`
    pub async fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<DocumentResult> {
        self.perform(Method::GET, &format!("/{}/{}/{}", index, doc_type, id), &[], None)
            .await?
            .decode()
    }

    pub async fn document_exists(&self, index: &str, doc_type: &str, id: &str) -> Result<bool> {
        let response = self
            .perform(Method::HEAD, &format!("/{}/{}/{}", index, doc_type, id), &[], None)
            .await?;
        Ok(response.status == 200)
    }

    pub async fn delete_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> Result<DocumentResult> {
        self.perform(Method::DELETE, &format!("/{}/{}/{}", index, doc_type, id), &[], None)
            .await?
            .decode()
    }

    /// Create an index, optionally with settings and mappings
    pub async fn create_index(
        &self,
        index: &str,
        body: Option<Body>,
    ) -> Result<AcknowledgedResponse> {
        self.perform(Method::PUT, &format!("/{}", index), &[], body)
            .await?
            .decode()
    }

    pub async fn delete_index(&self, index: &str) -> Result<AcknowledgedResponse> {
        let response = self
            .perform(Method::DELETE, &format!("/{}", index), &[], None)
            .await?;
        if response.is_not_found() {
            return Err(ProtocolError::new(404, Some(format!("no such index [{}]", index))).into());
        }
        response.decode()
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .perform(Method::HEAD, &format!("/{}", index), &[], None)
            .await?;
        Ok(response.status == 200)
    }

    /// Make recent writes visible to search
    pub async fn refresh(&self, indices: &[&str]) -> Result<BroadcastResponse> {
        let path = format!("{}/_refresh", indices_prefix(indices));
        self.perform(Method::POST, &path, &[], None).await?.decode()
    }

    pub async fn flush(&self, indices: &[&str]) -> Result<BroadcastResponse> {
        let path = format!("{}/_flush", indices_prefix(indices));
        self.perform(Method::POST, &path, &[], None).await?.decode()
    }

    /// Apply alias additions and removals atomically
    pub async fn update_aliases(&self, actions: &[AliasAction]) -> Result<AcknowledgedResponse> {
        let body = Body::json(&json!({ "actions": actions }))?;
        self.perform(Method::POST, "/_aliases", &[], Some(body))
            .await?
            .decode()
    }

    /// Run a search with a raw request body
    pub async fn search(&self, indices: &[&str], body: impl Into<Body>) -> Result<SearchResult> {
        let path = format!("{}/_search", indices_prefix(indices));
        self.perform(Method::POST, &path, &[], Some(body.into()))
            .await?
            .decode()
    }

    /// Number of documents matching `body` (all documents when `None`)
    pub async fn count(&self, indices: &[&str], body: Option<Body>) -> Result<u64> {
        #[derive(Deserialize)]
        struct CountResponse {
            count: u64,
        }

        let path = format!("{}/_count", indices_prefix(indices));
        let response: CountResponse = self.perform(Method::POST, &path, &[], body).await?.decode()?;
        Ok(response.count)
    }

    pub async fn cluster_health(&self, indices: &[&str]) -> Result<ClusterHealth> {
        let path = format!("/_cluster/health{}", indices_prefix(indices));
        self.perform(Method::GET, &path, &[], None).await?.decode()
    }

    /// Block until the cluster reaches `status` or `timeout` (e.g. "10s")
    /// passes on the server
    pub async fn wait_for_status(
        &self,
        status: HealthStatus,
        timeout: &str,
    ) -> Result<ClusterHealth> {
        let request = PerformRequest::new(Method::GET, "/_cluster/health")
            .param("wait_for_status", status.as_str())
            .param("timeout", timeout)
            .ignore(408);
        let health: ClusterHealth = self.execute(request).await?.decode()?;
        if health.timed_out {
            return Err(ProtocolError::new(
                408,
                Some(format!("timed out waiting for {} status", status)),
            )
            .into());
        }
        Ok(health)
    }

    pub async fn wait_for_green_status(&self, timeout: &str) -> Result<ClusterHealth> {
        self.wait_for_status(HealthStatus::Green, timeout).await
    }

    pub async fn wait_for_yellow_status(&self, timeout: &str) -> Result<ClusterHealth> {
        self.wait_for_status(HealthStatus::Yellow, timeout).await
    }

    /// HTTP details of every node in the cluster
    pub async fn nodes_info(&self) -> Result<NodesInfoResponse> {
        self.perform(Method::GET, "/_nodes/http", &[], None)
            .await?
            .decode()
    }

    /// Names of the plugins installed on any node, sorted and deduplicated
    pub async fn plugins(&self) -> Result<Vec<String>> {
        let info: NodesPluginsResponse = self
            .perform(Method::GET, "/_nodes/plugins", &[], None)
            .await?
            .decode()?;
        let names: BTreeSet<String> = info
            .nodes
            .into_values()
            .flat_map(|node| node.plugins)
            .map(|plugin| plugin.name)
            .collect();
        Ok(names.into_iter().collect())
    }

    pub async fn has_plugin(&self, name: &str) -> Result<bool> {
        Ok(self.plugins().await?.iter().any(|p| p == name))
    }

    /// Names of all indices, sorted
    pub async fn index_names(&self) -> Result<Vec<String>> {
        let aliases: BTreeMap<String, Value> = self
            .perform(Method::GET, "/_aliases", &[], None)
            .await?
            .decode()?;
        Ok(aliases.into_keys().collect())
    }
}
