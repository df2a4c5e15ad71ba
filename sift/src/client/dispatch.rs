//! Request dispatch with retries across nodes
//!
//! Every logical operation funnels through [`Client::execute`]:
//!
//! ```text
//! next node ──NoClient──> health check (first time only), then ask retrier
//!      │
//!      └─> transport.send ──error──> mark dead, ask retrier
//!               │
//!               └─> classify ──retry──> ask retrier
//!                        ├─────fatal──> return error, node untouched
//!                        └───success──> mark healthy, return response
//! ```
//!
//! The retrier either names a wait before the next attempt or gives up, in
//! which case the error of the failed attempt is returned.

use super::Client;
use crate::classify::{classify, Classification};
use crate::error::{Error, Result};
use crate::health::healthcheck;
use crate::metrics::{self, RequestTimer};
use crate::response::{Body, Response};
use crate::retrier::{BackoffRetrier, Retrier};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Method;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, trace};

/// A logical request, independent of the node that ends up serving it
#[derive(Debug, Clone)]
pub struct PerformRequest {
    pub method: Method,
    /// Path below the node URL, starting with `/`
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Body>,
    /// Statuses of 400 and above to hand back as responses instead of errors
    pub ignore_statuses: Vec<u16>,
}

impl PerformRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            ignore_statuses: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn ignore(mut self, status: u16) -> Self {
        self.ignore_statuses.push(status);
        self
    }

    fn url_for(&self, node_url: &str, query: &str) -> String {
        let mut url = String::with_capacity(node_url.len() + self.path.len() + query.len() + 2);
        url.push_str(node_url);
        if !self.path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&self.path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

impl Client {
    /// Send a request to the cluster
    pub async fn perform(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<Body>,
    ) -> Result<Response> {
        let mut request = PerformRequest::new(method, path);
        request.params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        request.body = body;
        self.execute(request).await
    }

    /// Send a request to the cluster, retrying on other nodes after
    /// connectivity failures and statuses configured as retryable
    pub async fn execute(&self, request: PerformRequest) -> Result<Response> {
        let inner = &self.inner;
        let (retrier, retry_statuses, get_body_as, gzip, healthcheck_timeout) = {
            let settings = inner.settings.read();
            let config = &settings.config;
            let retrier: Arc<dyn Retrier> = match &inner.retrier {
                Some(retrier) => retrier.clone(),
                None => Arc::new(BackoffRetrier::from_config(config)),
            };
            (
                retrier,
                config.retry_statuses.clone(),
                config.send_get_body_as.clone(),
                config.gzip,
                config.healthcheck_timeout(),
            )
        };

        let body = request.body.clone().map(Body::into_bytes).transpose()?;
        let payload = match &body {
            Some(body) if gzip => Some(gzip_bytes(body)?),
            other => other.clone(),
        };
        let mut method = request.method.clone();
        if method == Method::GET && body.is_some() && get_body_as == "POST" {
            method = Method::POST;
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(request.params.iter())
            .finish();

        let timer = RequestTimer::new(method.as_str());
        let mut retry: u32 = 0;
        let mut health_checked = false;

        loop {
            let node = match inner.next_node() {
                Ok(node) => node,
                Err(err) => {
                    if !health_checked {
                        // Give dead nodes one chance to come back; a no-op
                        // when health checks are disabled
                        health_checked = true;
                        healthcheck(inner, healthcheck_timeout, false).await;
                    }
                    retry += 1;
                    let Some(wait) = retrier.retry(retry, &err) else {
                        timer.error(err.error_type());
                        return Err(err);
                    };
                    metrics::record_retry("no_client");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let url = request.url_for(&node.url, &query);
            let mut http = inner.http_request(method.clone(), url.clone());
            if let Some(payload) = &payload {
                http.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                if gzip {
                    http.headers
                        .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                }
                http.body = Some(payload.clone());
            }
            trace!(
                method = %method,
                url = %url,
                body = %body.as_ref().map(|b| String::from_utf8_lossy(b)).unwrap_or_default(),
                "Request"
            );

            let response = match inner.transport.send(http).await {
                Ok(response) => response,
                Err(err) => {
                    error!("{} {} failed: {}", method, url, err);
                    inner.registry.mark_dead(&node.id);
                    error!("{} is dead", node.url);
                    let err = Error::Transport(err);
                    retry += 1;
                    let Some(wait) = retrier.retry(retry, &err) else {
                        timer.error(err.error_type());
                        return Err(err);
                    };
                    metrics::record_retry("transport");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            trace!(
                status = response.status,
                body = %String::from_utf8_lossy(&response.body),
                "Response"
            );

            match classify(&response, &request.ignore_statuses, &retry_statuses) {
                Classification::Success => {
                    inner.registry.mark_healthy(&node.id);
                    let elapsed = timer.success(response.status);
                    info!(
                        "{} {} [status:{}, request:{:.3}s]",
                        method,
                        url,
                        response.status,
                        elapsed.as_secs_f64()
                    );
                    return Ok(Response::new(
                        response.status,
                        response.headers,
                        response.body,
                        inner.decoder.clone(),
                    ));
                }
                Classification::Retry(err) => {
                    retry += 1;
                    let Some(wait) = retrier.retry(retry, &err) else {
                        timer.error(err.error_type());
                        return Err(err);
                    };
                    metrics::record_retry("status");
                    tokio::time::sleep(wait).await;
                }
                Classification::Fatal(err) => {
                    timer.error(err.error_type());
                    return Err(err);
                }
            }
        }
    }
}

fn gzip_bytes(body: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    Ok(Bytes::from(encoder.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::error::TransportError;
    use crate::retrier::NoRetries;
    use crate::testing::StubTransport;
    use crate::transport::HttpResponse;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn client(stub: Arc<StubTransport>, urls: &[&str], max_retries: u32) -> Client {
        ClientBuilder::new()
            .urls(urls.iter().copied())
            .transport(stub)
            .max_retries(max_retries)
            .build_simple()
            .unwrap()
    }

    /// Seeded registry with health checks on and nothing spawned. Sniffing
    /// stays enabled so an all-dead registry is not revived.
    fn checked_client(stub: Arc<StubTransport>, urls: &[&str], max_retries: u32) -> Client {
        let inner = ClientBuilder::new()
            .urls(urls.iter().copied())
            .transport(stub)
            .max_retries(max_retries)
            .prepare()
            .unwrap();
        inner.seed_registry();
        Client { inner }
    }

    #[tokio::test]
    async fn test_request_shape() {
        let stub = Arc::new(StubTransport::fixed(200, r#"{"ok":true}"#));
        let client = client(stub.clone(), &["http://a:9200"], 0);

        let response = client
            .perform(
                Method::PUT,
                "/twitter/tweet/1",
                &[("refresh", "true"), ("q", "a b")],
                Some(json!({"user": "olivere"}).into()),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let request = &stub.requests()[0];
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.url, "http://a:9200/twitter/tweet/1?refresh=true&q=a+b");
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers[reqwest::header::ACCEPT], "application/json");
        assert!(request.headers.contains_key(reqwest::header::USER_AGENT));
        assert_eq!(request.body.as_deref(), Some(&br#"{"user":"olivere"}"#[..]));
    }

    #[tokio::test]
    async fn test_no_body_no_content_type() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = client(stub.clone(), &["http://a:9200"], 0);
        client.perform(Method::GET, "/", &[], None).await.unwrap();

        let request = &stub.requests()[0];
        assert_eq!(request.url, "http://a:9200/");
        assert!(!request.headers.contains_key(CONTENT_TYPE));
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_send_get_body_as_post() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = ClientBuilder::new()
            .urls(["http://a:9200"])
            .transport(stub.clone())
            .send_get_body_as("POST")
            .build_simple()
            .unwrap();

        client
            .perform(Method::GET, "/_search", &[], Some("{}".into()))
            .await
            .unwrap();
        client.perform(Method::GET, "/", &[], None).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[1].method, Method::GET);
    }

    #[tokio::test]
    async fn test_not_found_is_a_response() {
        let stub = Arc::new(StubTransport::fixed(404, r#"{"found":false}"#));
        let client = client(stub, &["http://a:9200"], 0);
        let response = client.perform(Method::GET, "/i/t/1", &[], None).await.unwrap();
        assert!(response.is_not_found());
        assert!(client.nodes()[0].is_alive());
    }

    #[tokio::test]
    async fn test_protocol_error_is_not_retried() {
        let stub = Arc::new(StubTransport::fixed(500, r#"{"status":500,"error":"X"}"#));
        let client = client(stub.clone(), &["http://a:9200", "http://b:9200"], 5);

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        match err {
            Error::Protocol(e) => {
                assert_eq!(e.status, 500);
                assert_eq!(e.message.as_deref(), Some("X"));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
        assert_eq!(stub.calls(), 1);
        assert!(client.nodes().iter().all(|n| n.is_alive()));
    }

    #[tokio::test]
    async fn test_ignored_status_is_a_response() {
        let stub = Arc::new(StubTransport::fixed(409, r#"{"error":"conflict"}"#));
        let client = client(stub, &["http://a:9200"], 0);
        let response = client
            .execute(PerformRequest::new(Method::PUT, "/i/t/1/_create").ignore(409))
            .await
            .unwrap();
        assert_eq!(response.status, 409);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_are_retried() {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let stub = Arc::new(StubTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TransportError::new("connection reset"))
            } else {
                Ok(HttpResponse::new(200, "{}"))
            }
        }));
        let client = client(stub.clone(), &["http://a:9200", "http://b:9200", "http://c:9200"], 3);

        let response = client.perform(Method::GET, "/", &[], None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(stub.calls(), 3);

        // a and b failed; c served the request
        let nodes = client.nodes();
        assert!(nodes[0].is_dead());
        assert!(nodes[1].is_dead());
        assert!(nodes[2].is_alive());
        assert_eq!(nodes[2].failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let stub = Arc::new(StubTransport::new(|_| Err(TransportError::new("connection refused"))));
        let client = client(stub.clone(), &["http://a:9200", "http://b:9200", "http://c:9200"], 1);

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        // First attempt plus one retry
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_dead_forces_one_healthcheck() {
        let stub = Arc::new(StubTransport::fixed(503, ""));
        let client = checked_client(stub.clone(), &["http://a:9200", "http://b:9200"], 2);
        client.inner.registry.mark_dead("http://a:9200");
        client.inner.registry.mark_dead("http://b:9200");

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::NoClient(_)));
        // One check of both nodes, despite three passes over the registry
        assert_eq!(stub.calls_to("?timeout=1"), 2);
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthcheck_revives_nodes_for_the_retry() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = checked_client(stub.clone(), &["http://a:9200"], 1);
        client.inner.registry.mark_dead("http://a:9200");

        let response = client.perform(Method::GET, "/", &[], None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(stub.calls_to("?timeout=1"), 1);
        assert_eq!(stub.calls(), 2);
        assert_eq!(client.nodes()[0].failures, 0);
    }

    #[tokio::test]
    async fn test_no_client_without_retries() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = checked_client(stub.clone(), &["http://a:9200"], 0);
        client.inner.registry.mark_dead("http://a:9200");

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::NoClient(_)));
        // The check ran and revived the node, but there was no budget left
        assert_eq!(stub.calls_to("?timeout=1"), 1);
        assert!(client.nodes()[0].is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_healthcheck_sends_nothing() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let inner = ClientBuilder::new()
            .urls(["http://a:9200"])
            .transport(stub.clone())
            .healthcheck(false)
            .max_retries(2)
            .prepare()
            .unwrap();
        inner.seed_registry();
        let client = Client { inner };
        client.inner.registry.mark_dead("http://a:9200");

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::NoClient(_)));
        assert_eq!(stub.calls(), 0);
        assert!(client.nodes()[0].is_dead());
    }

    #[tokio::test]
    async fn test_dead_nodes_resurrected_without_sniffing() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = client(stub.clone(), &["http://a:9200"], 0);
        client.inner.registry.mark_dead("http://a:9200");

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::NoClient(_)));
        assert_eq!(stub.calls(), 0);
        assert!(client.nodes()[0].is_alive());

        let response = client.perform(Method::GET, "/", &[], None).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retrier_decides() {
        struct TwoQuickRetries(AtomicUsize);

        impl Retrier for TwoQuickRetries {
            fn retry(&self, retry: u32, err: &Error) -> Option<Duration> {
                assert!(matches!(err, Error::Transport(_)));
                self.0.fetch_add(1, Ordering::SeqCst);
                (retry <= 2).then_some(Duration::from_millis(1))
            }
        }

        let stub = Arc::new(StubTransport::new(|_| Err(TransportError::new("connection reset"))));
        let retrier = Arc::new(TwoQuickRetries(AtomicUsize::new(0)));
        let client = ClientBuilder::new()
            .urls(["http://a:9200", "http://b:9200", "http://c:9200"])
            .transport(stub.clone())
            .retrier(retrier.clone())
            .build_simple()
            .unwrap();

        let err = client.perform(Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        // max_retries stays at 0, yet the retrier allowed two retries
        assert_eq!(stub.calls(), 3);
        assert_eq!(retrier.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retries_retrier() {
        let stub = Arc::new(StubTransport::new(|_| Err(TransportError::new("connection reset"))));
        let client = ClientBuilder::new()
            .urls(["http://a:9200", "http://b:9200"])
            .transport(stub.clone())
            .max_retries(5)
            .retrier(NoRetries)
            .build_simple()
            .unwrap();

        assert!(client.perform(Method::GET, "/", &[], None).await.is_err());
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_gzip_body() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = ClientBuilder::new()
            .urls(["http://a:9200"])
            .transport(stub.clone())
            .gzip(true)
            .build_simple()
            .unwrap();

        client
            .perform(Method::PUT, "/i/t/1", &[], Some(json!({"user": "olivere"}).into()))
            .await
            .unwrap();
        client.perform(Method::GET, "/", &[], None).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests[0].headers[CONTENT_ENCODING], "gzip");
        assert_eq!(requests[0].headers[CONTENT_TYPE], "application/json");
        let mut decoded = String::new();
        GzDecoder::new(&requests[0].body.as_deref().unwrap()[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, r#"{"user":"olivere"}"#);

        assert!(!requests[1].headers.contains_key(CONTENT_ENCODING));
        assert!(requests[1].body.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_statuses_do_not_mark_dead() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let stub = Arc::new(StubTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(HttpResponse::new(503, r#"{"status":503,"error":"busy"}"#))
            } else {
                Ok(HttpResponse::new(200, "{}"))
            }
        }));
        let client = ClientBuilder::new()
            .urls(["http://a:9200", "http://b:9200"])
            .transport(stub.clone())
            .max_retries(1)
            .retry_statuses([503])
            .build_simple()
            .unwrap();

        client.perform(Method::GET, "/", &[], None).await.unwrap();
        assert_eq!(stub.calls(), 2);
        assert!(client.nodes().iter().all(|n| n.is_alive()));
    }

    #[tokio::test]
    async fn test_round_robin_across_requests() {
        let stub = Arc::new(StubTransport::fixed(200, "{}"));
        let client = client(stub.clone(), &["http://a:9200", "http://b:9200"], 0);
        for _ in 0..4 {
            client.perform(Method::GET, "/", &[], None).await.unwrap();
        }
        assert_eq!(stub.calls_to("http://a:9200"), 2);
        assert_eq!(stub.calls_to("http://b:9200"), 2);
    }

    #[test]
    fn test_url_for_adds_missing_slash() {
        let request = PerformRequest::new(Method::GET, "_cluster/health");
        assert_eq!(
            request.url_for("http://a:9200", "level=indices"),
            "http://a:9200/_cluster/health?level=indices"
        );
    }
}
