//! Sift - Cluster-aware client for Elasticsearch-compatible search services
//!
//! The client keeps an evolving view of a multi-node cluster and routes
//! every request to a live node, retrying across nodes on connectivity
//! failures.
//!
//! # Architecture
//!
//! - **Registry**: ordered node records with pluggable selection (round-robin by default)
//! - **Sniffer**: background discovery of cluster membership via `/_nodes/http`
//! - **Health checker**: background liveness probes of every registered node
//! - **Dispatcher**: node selection, classification and retry through a pluggable retrier
//! - **Transport**: async HTTP seam, `reqwest` by default
//! - **Bulk**: buffered line-delimited write batches
//! - **Scroll**: paged cursor over server-held result contexts
//!
//! # Example
//!
//! ```no_run
//! use sift::{Client, ClientConfig, Method};
//!
//! # async fn run() -> sift::Result<()> {
//! let client = Client::new(ClientConfig::with_urls(["http://127.0.0.1:9200"])).await?;
//! let response = client.perform(Method::GET, "/_cluster/health", &[], None).await?;
//! println!("{}", response.text());
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod canonical;
pub mod classify;
pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod ops;
pub mod registry;
pub mod response;
pub mod retrier;
pub mod scroll;
pub mod search;
pub mod sniffer;
pub mod transport;

mod background;
mod backoff;
mod client;
mod health;

#[cfg(test)]
mod testing;

pub use backoff::Backoff;
pub use bulk::{
    BulkAction, BulkDeleteRequest, BulkIndexRequest, BulkResponse, BulkResponseItem, BulkService,
    BulkUpdateRequest,
};
pub use canonical::{canonicalize, canonicalize_url};
pub use classify::{classify, Classification};
pub use client::{Client, ClientBuilder, PerformRequest};
pub use config::ClientConfig;
pub use error::{Error, ProtocolError, Result, TransportError};
pub use node::{Node, NodeState};
pub use ops::{
    AliasAction, ClusterHealth, DocumentResult, HealthStatus, NodePlugins, NodesPluginsResponse,
    PingResult, PluginInfo,
};
pub use registry::{MembershipChange, NodeRegistry, NodeSelector, RoundRobin};
pub use response::{Body, Decoder, JsonDecoder, Response};
pub use retrier::{BackoffRetrier, NoRetries, Retrier};
pub use scroll::{ScrollCursor, ScrollService};
pub use search::{SearchHit, SearchHits, SearchResult, TotalHits};
pub use sniffer::{NodeInfo, NodesInfoResponse, SnifferFilter};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

pub use reqwest::Method;
