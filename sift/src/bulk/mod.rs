//! Bulk writes
//!
//! [`BulkService`] buffers index, create, update and delete actions and
//! submits them in one `_bulk` request as newline-terminated JSON lines.
//! The buffer is emptied after every successful submit and can be reused.

mod request;
mod response;

pub use request::{ActionMeta, BulkAction, BulkDeleteRequest, BulkIndexRequest, BulkUpdateRequest};
pub use response::{BulkResponse, BulkResponseItem};

use crate::client::{Client, PerformRequest};
use crate::error::{Error, Result};
use reqwest::Method;
use tracing::debug;

/// Buffer of bulk actions bound to a client
#[derive(Debug)]
pub struct BulkService {
    client: Client,
    index: Option<String>,
    doc_type: Option<String>,
    refresh: Option<bool>,
    timeout: Option<String>,
    actions: Vec<BulkAction>,
}

impl Client {
    /// Start an empty bulk buffer
    pub fn bulk(&self) -> BulkService {
        BulkService::new(self.clone())
    }
}

impl BulkService {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            doc_type: None,
            refresh: None,
            timeout: None,
            actions: Vec::new(),
        }
    }

    /// Default index for actions that name none
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Default type for actions that name none
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Server-side timeout, e.g. "1m"
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Append an action; usable in a chain or on a `&mut` buffer
    pub fn add(&mut self, action: impl Into<BulkAction>) -> &mut Self {
        self.actions.push(action.into());
        self
    }

    pub fn number_of_actions(&self) -> usize {
        self.actions.len()
    }

    /// Size of the serialized body, including newlines
    pub fn estimated_size_in_bytes(&self) -> usize {
        self.actions
            .iter()
            .filter_map(|a| a.lines().ok())
            .flatten()
            .map(|line| line.len() + 1)
            .sum()
    }

    /// Serialized request body
    pub fn body_as_string(&self) -> Result<String> {
        let mut body = String::new();
        for action in &self.actions {
            for line in action.lines()? {
                body.push_str(&line);
                body.push('\n');
            }
        }
        Ok(body)
    }

    fn path(&self) -> String {
        let mut path = String::from("/");
        if let Some(index) = &self.index {
            path.push_str(index);
            path.push('/');
        }
        if let Some(doc_type) = &self.doc_type {
            path.push_str(doc_type);
            path.push('/');
        }
        path.push_str("_bulk");
        path
    }

    /// Send all buffered actions.
    ///
    /// Fails with [`Error::NoBulkActions`] on an empty buffer. Per-item
    /// failures are reported in the response, not as an error, and the
    /// buffer is emptied either way.
    pub async fn submit(&mut self) -> Result<BulkResponse> {
        if self.actions.is_empty() {
            return Err(Error::NoBulkActions);
        }

        let body = self.body_as_string()?;
        let mut request = PerformRequest::new(Method::POST, self.path()).body(body);
        if let Some(refresh) = self.refresh {
            request = request.param("refresh", refresh.to_string());
        }
        if let Some(timeout) = &self.timeout {
            request = request.param("timeout", timeout.clone());
        }

        let response = self.client.execute(request).await?;
        let result: BulkResponse = response.decode()?;

        debug!(
            actions = self.actions.len(),
            failed = result.failed().len(),
            took = result.took,
            "Bulk submitted"
        );
        self.actions.clear();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::testing::StubTransport;
    use serde_json::json;
    use std::sync::Arc;

    const ANSWER: &str = r#"{"took":3,"errors":false,"items":[
        {"index":{"_index":"twitter","_type":"tweet","_id":"1","status":201}},
        {"delete":{"_index":"twitter","_type":"tweet","_id":"2","status":200,"found":true}}]}"#;

    fn client(stub: Arc<StubTransport>) -> Client {
        ClientBuilder::new()
            .urls(["http://a:9200"])
            .transport(stub)
            .build_simple()
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_submit_fails() {
        let stub = Arc::new(StubTransport::fixed(200, ANSWER));
        let mut bulk = client(stub.clone()).bulk();
        assert!(matches!(bulk.submit().await, Err(Error::NoBulkActions)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_posts_lines_and_clears() {
        let stub = Arc::new(StubTransport::fixed(200, ANSWER));
        let mut bulk = client(stub.clone()).bulk().index("twitter").refresh(true);
        bulk.add(BulkIndexRequest::new().doc_type("tweet").id("1").doc(json!({"user": "olivere"})))
            .add(BulkDeleteRequest::new().doc_type("tweet").id("2"));
        assert_eq!(bulk.number_of_actions(), 2);

        let expected = "{\"index\":{\"_id\":\"1\",\"_type\":\"tweet\"}}\n\
                        {\"user\":\"olivere\"}\n\
                        {\"delete\":{\"_id\":\"2\",\"_type\":\"tweet\"}}\n";
        assert_eq!(bulk.body_as_string().unwrap(), expected);
        assert_eq!(bulk.estimated_size_in_bytes(), expected.len());

        let response = bulk.submit().await.unwrap();
        assert_eq!(response.indexed().len(), 1);
        assert_eq!(response.deleted().len(), 1);
        assert!(response.failed().is_empty());
        assert_eq!(bulk.number_of_actions(), 0);

        let request = &stub.requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://a:9200/twitter/_bulk?refresh=true");
        assert_eq!(request.body.as_deref(), Some(expected.as_bytes()));
    }

    #[tokio::test]
    async fn test_buffer_kept_on_failure() {
        let stub = Arc::new(StubTransport::fixed(400, r#"{"status":400,"error":"bad"}"#));
        let mut bulk = client(stub).bulk();
        bulk.add(BulkDeleteRequest::new().index("i").doc_type("t").id("1"));
        assert!(bulk.submit().await.is_err());
        assert_eq!(bulk.number_of_actions(), 1);
    }

    #[test]
    fn test_path() {
        let client = Client::simple(Default::default()).unwrap();
        assert_eq!(client.bulk().path(), "/_bulk");
        assert_eq!(client.bulk().index("i").path(), "/i/_bulk");
        assert_eq!(client.bulk().index("i").doc_type("t").path(), "/i/t/_bulk");
    }
}
