//! In-memory search node served over real HTTP for end-to-end tests.
//!
//! Implements just enough of the REST surface for the client: root
//! ping/HEAD, node info and plugins, document CRUD, index admin, aliases, refresh/flush,
//! search with scan/scroll, bulk and cluster health.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredDoc {
    doc_type: String,
    version: i64,
    source: Value,
}

#[derive(Debug)]
struct ScrollContext {
    hits: Vec<Value>,
    position: usize,
    size: usize,
    total: usize,
}

#[derive(Default)]
struct Cluster {
    url: String,
    indices: BTreeMap<String, BTreeMap<String, StoredDoc>>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    scrolls: HashMap<String, ScrollContext>,
    next_id: u64,
}

/// Shared state of a fake node
pub struct FakeState {
    cluster: Mutex<Cluster>,
    /// Number of HEAD requests against the root (health probes)
    pub heads: AtomicUsize,
    /// Number of node-info requests (sniffs)
    pub sniffs: AtomicUsize,
}

pub struct FakeNode {
    pub url: String,
    pub state: Arc<FakeState>,
    pub handle: tokio::task::JoinHandle<()>,
}

impl FakeNode {
    pub fn heads(&self) -> usize {
        self.state.heads.load(Ordering::SeqCst)
    }

    pub fn sniffs(&self) -> usize {
        self.state.sniffs.load(Ordering::SeqCst)
    }

    /// Number of live scroll contexts
    pub fn open_scrolls(&self) -> usize {
        self.state.cluster.lock().scrolls.len()
    }

    pub fn doc_count(&self, index: &str) -> usize {
        self.state
            .cluster
            .lock()
            .indices
            .get(index)
            .map_or(0, |docs| docs.len())
    }
}

/// Start a fake node on a random port
pub async fn start_node() -> FakeNode {
    let state = Arc::new(FakeState {
        cluster: Mutex::new(Cluster::default()),
        heads: AtomicUsize::new(0),
        sniffs: AtomicUsize::new(0),
    });

    let router = Router::new().fallback(handle).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);
    state.cluster.lock().url = url.clone();

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    FakeNode { url, state, handle }
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"status": status.as_u16(), "error": message.into()})),
    )
        .into_response()
}

fn ok(value: Value) -> Response {
    Json(value).into_response()
}

fn query_params(uri: &Uri) -> HashMap<String, String> {
    uri.query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let params = query_params(&uri);
    let segments: Vec<&str> = uri.path().split('/').filter(|s| !s.is_empty()).collect();

    if method == Method::HEAD && segments.is_empty() {
        state.heads.fetch_add(1, Ordering::SeqCst);
        return StatusCode::OK.into_response();
    }
    if segments == ["_nodes", "http"] {
        state.sniffs.fetch_add(1, Ordering::SeqCst);
    }

    let mut cluster = state.cluster.lock();
    cluster.route(&method, &segments, &params, &body)
}

impl Cluster {
    fn route(
        &mut self,
        method: &Method,
        segments: &[&str],
        params: &HashMap<String, String>,
        body: &[u8],
    ) -> Response {
        match (method.as_str(), segments) {
            ("GET", []) => ok(json!({
                "name": "fake",
                "cluster_name": "sift-test",
                "version": {"number": "2.4.6", "build_hash": "abc", "lucene_version": "5.5.4"},
                "tagline": "You Know, for Search"
            })),
            ("GET", ["_nodes", "http"]) => {
                let address = self.url.trim_start_matches("http://").to_string();
                ok(json!({
                    "cluster_name": "sift-test",
                    "nodes": {
                        "node-1": {
                            "name": "fake",
                            "version": "2.4.6",
                            "http_address": format!("inet[/{}]", address),
                            "http": {"publish_address": address}
                        }
                    }
                }))
            }
            ("GET", ["_nodes", "plugins"]) => ok(json!({
                "cluster_name": "sift-test",
                "nodes": {
                    "node-1": {
                        "name": "fake",
                        "plugins": [{"name": "analysis-icu", "version": "2.4.6"}]
                    }
                }
            })),
            ("GET", ["_cluster", "health", ..]) => ok(json!({
                "cluster_name": "sift-test",
                "status": "green",
                "timed_out": false,
                "number_of_nodes": 1,
                "number_of_data_nodes": 1,
                "active_primary_shards": self.indices.len(),
                "active_shards": self.indices.len(),
                "relocating_shards": 0,
                "initializing_shards": 0,
                "unassigned_shards": 0
            })),
            ("GET", ["_aliases"]) => {
                let mut out = Map::new();
                for index in self.indices.keys() {
                    let aliases: Map<String, Value> = self
                        .aliases
                        .iter()
                        .filter(|(_, targets)| targets.contains(index))
                        .map(|(alias, _)| (alias.clone(), json!({})))
                        .collect();
                    out.insert(index.clone(), json!({ "aliases": aliases }));
                }
                ok(Value::Object(out))
            }
            ("POST", ["_aliases"]) => self.update_aliases(body),
            ("POST", ["_refresh"]) | ("POST", ["_flush"]) => self.shards(),
            ("POST", [_, "_refresh"]) | ("POST", [_, "_flush"]) => self.shards(),
            ("POST", ["_bulk"]) => self.bulk(None, None, body),
            ("POST", [index, "_bulk"]) => self.bulk(Some(*index), None, body),
            ("POST", [index, doc_type, "_bulk"]) => self.bulk(Some(*index), Some(*doc_type), body),
            ("POST", ["_search", "scroll"]) => self.scroll_next(body),
            ("DELETE", ["_search", "scroll"]) => self.scroll_clear(body),
            ("POST", ["_search"]) | ("GET", ["_search"]) => self.search("", params, body),
            ("POST", [indices, "_search"]) | ("GET", [indices, "_search"])
            | ("POST", [indices, _, "_search"]) | ("GET", [indices, _, "_search"]) => {
                self.search(indices, params, body)
            }
            ("POST", [indices, "_count"]) | ("GET", [indices, "_count"]) => {
                let total = self.matching(indices, body).len();
                ok(json!({ "count": total }))
            }
            ("PUT", [index]) => {
                if self.indices.contains_key(*index) {
                    return error(
                        StatusCode::BAD_REQUEST,
                        format!("IndexAlreadyExistsException[[{}] already exists]", index),
                    );
                }
                self.indices.insert(index.to_string(), BTreeMap::new());
                ok(json!({"acknowledged": true}))
            }
            ("DELETE", [index]) => match self.indices.remove(*index) {
                Some(_) => {
                    for targets in self.aliases.values_mut() {
                        targets.remove(*index);
                    }
                    ok(json!({"acknowledged": true}))
                }
                None => error(
                    StatusCode::NOT_FOUND,
                    format!("IndexMissingException[[{}] missing]", index),
                ),
            },
            ("HEAD", [index]) => {
                if self.indices.contains_key(*index) {
                    StatusCode::OK.into_response()
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }
            ("POST", [index, doc_type]) => {
                self.next_id += 1;
                let id = format!("auto-{}", self.next_id);
                self.put_doc(index, doc_type, &id, body)
            }
            ("PUT", [index, doc_type, id]) | ("POST", [index, doc_type, id]) => {
                self.put_doc(index, doc_type, id, body)
            }
            ("GET", [index, doc_type, id]) => match self.doc(index, id) {
                Some(doc) => ok(json!({
                    "_index": index, "_type": doc.doc_type, "_id": id,
                    "_version": doc.version, "found": true, "_source": doc.source
                })),
                None => (
                    StatusCode::NOT_FOUND,
                    Json(json!({"_index": index, "_type": doc_type, "_id": id, "found": false})),
                )
                    .into_response(),
            },
            ("HEAD", [index, _, id]) => match self.doc(index, id) {
                Some(_) => StatusCode::OK.into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            },
            ("DELETE", [index, doc_type, id]) => {
                let removed = self
                    .indices
                    .get_mut(*index)
                    .and_then(|docs| docs.remove(*id));
                let status = if removed.is_some() { StatusCode::OK } else { StatusCode::NOT_FOUND };
                (
                    status,
                    Json(json!({
                        "_index": index, "_type": doc_type, "_id": id,
                        "found": removed.is_some()
                    })),
                )
                    .into_response()
            }
            _ => error(
                StatusCode::BAD_REQUEST,
                format!("No handler for {} /{}", method, segments.join("/")),
            ),
        }
    }

    fn shards(&self) -> Response {
        ok(json!({"_shards": {"total": 1, "successful": 1, "failed": 0}}))
    }

    fn doc(&self, index: &str, id: &str) -> Option<&StoredDoc> {
        self.indices.get(index).and_then(|docs| docs.get(id))
    }

    fn store(&mut self, index: &str, doc_type: &str, id: &str, source: Value) -> (i64, bool) {
        let docs = self.indices.entry(index.to_string()).or_default();
        let version = docs.get(id).map_or(1, |d| d.version + 1);
        docs.insert(
            id.to_string(),
            StoredDoc {
                doc_type: doc_type.to_string(),
                version,
                source,
            },
        );
        (version, version == 1)
    }

    fn put_doc(&mut self, index: &str, doc_type: &str, id: &str, body: &[u8]) -> Response {
        let Ok(source) = serde_json::from_slice::<Value>(body) else {
            return error(StatusCode::BAD_REQUEST, "MapperParsingException[failed to parse]");
        };
        let (version, created) = self.store(index, doc_type, id, source);
        let status = if created { StatusCode::CREATED } else { StatusCode::OK };
        (
            status,
            Json(json!({
                "_index": index, "_type": doc_type, "_id": id,
                "_version": version, "created": created
            })),
        )
            .into_response()
    }

    fn update_aliases(&mut self, body: &[u8]) -> Response {
        let Ok(request) = serde_json::from_slice::<Value>(body) else {
            return error(StatusCode::BAD_REQUEST, "invalid alias request");
        };
        let actions = request["actions"].as_array().cloned().unwrap_or_default();
        for action in actions {
            if let Some(add) = action.get("add") {
                let index = add["index"].as_str().unwrap_or_default().to_string();
                let alias = add["alias"].as_str().unwrap_or_default().to_string();
                if !self.indices.contains_key(&index) {
                    return error(
                        StatusCode::NOT_FOUND,
                        format!("IndexMissingException[[{}] missing]", index),
                    );
                }
                self.aliases.entry(alias).or_default().insert(index);
            } else if let Some(remove) = action.get("remove") {
                let index = remove["index"].as_str().unwrap_or_default();
                let alias = remove["alias"].as_str().unwrap_or_default();
                if let Some(targets) = self.aliases.get_mut(alias) {
                    targets.remove(index);
                }
            }
        }
        ok(json!({"acknowledged": true}))
    }

    /// Expand comma-separated names and aliases into concrete indices
    fn resolve(&self, names: &str) -> Vec<String> {
        if names.is_empty() || names == "_all" {
            return self.indices.keys().cloned().collect();
        }
        let mut out = BTreeSet::new();
        for name in names.split(',') {
            if self.indices.contains_key(name) {
                out.insert(name.to_string());
            } else if let Some(targets) = self.aliases.get(name) {
                out.extend(targets.iter().cloned());
            }
        }
        out.into_iter().collect()
    }

    /// Hits matching `match_all` or a single-field `term`
    fn matching(&self, names: &str, body: &[u8]) -> Vec<Value> {
        let request: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let term = request
            .pointer("/query/term")
            .and_then(|t| t.as_object())
            .and_then(|t| t.iter().next())
            .map(|(field, value)| (field.clone(), value.clone()));

        let mut hits = Vec::new();
        for index in self.resolve(names) {
            let Some(docs) = self.indices.get(&index) else {
                continue;
            };
            for (id, doc) in docs {
                if let Some((field, value)) = &term {
                    if doc.source.get(field) != Some(value) {
                        continue;
                    }
                }
                hits.push(json!({
                    "_index": index, "_type": doc.doc_type, "_id": id,
                    "_score": 1.0, "_source": doc.source
                }));
            }
        }
        hits
    }

    fn search(&mut self, names: &str, params: &HashMap<String, String>, body: &[u8]) -> Response {
        let hits = self.matching(names, body);
        let total = hits.len();
        let size = params
            .get("size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10usize);

        let Some(_keep_alive) = params.get("scroll") else {
            let page: Vec<Value> = hits.into_iter().take(size).collect();
            return ok(json!({
                "took": 1, "timed_out": false,
                "hits": {"total": total, "max_score": 1.0, "hits": page}
            }));
        };

        let scan = params.get("search_type").map(String::as_str) == Some("scan");
        let first: Vec<Value> = if scan {
            Vec::new()
        } else {
            hits.iter().take(size).cloned().collect()
        };
        let position = first.len();

        self.next_id += 1;
        let scroll_id = format!("scroll-{}", self.next_id);
        self.scrolls.insert(
            scroll_id.clone(),
            ScrollContext {
                hits,
                position,
                size,
                total,
            },
        );
        ok(json!({
            "_scroll_id": scroll_id, "took": 1, "timed_out": false,
            "hits": {"total": total, "max_score": 0.0, "hits": first}
        }))
    }

    fn scroll_next(&mut self, body: &[u8]) -> Response {
        let scroll_id = String::from_utf8_lossy(body).trim().to_string();
        let Some(context) = self.scrolls.get_mut(&scroll_id) else {
            return error(
                StatusCode::NOT_FOUND,
                "SearchContextMissingException[No search context found]",
            );
        };
        let end = (context.position + context.size).min(context.hits.len());
        let page: Vec<Value> = context.hits[context.position..end].to_vec();
        context.position = end;
        ok(json!({
            "_scroll_id": scroll_id, "took": 1, "timed_out": false,
            "hits": {"total": context.total, "max_score": 0.0, "hits": page}
        }))
    }

    fn scroll_clear(&mut self, body: &[u8]) -> Response {
        let request: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let ids: Vec<String> = request["scroll_id"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        for id in &ids {
            self.scrolls.remove(id);
        }
        ok(json!({"succeeded": true, "num_freed": ids.len()}))
    }

    fn bulk(&mut self, index: Option<&str>, doc_type: Option<&str>, body: &[u8]) -> Response {
        let text = String::from_utf8_lossy(body);
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(line) = lines.next() {
            let Ok(Value::Object(command)) = serde_json::from_str::<Value>(line) else {
                return error(StatusCode::BAD_REQUEST, format!("invalid bulk line: {}", line));
            };
            let Some((action, meta)) = command.into_iter().next() else {
                return error(StatusCode::BAD_REQUEST, "empty bulk command");
            };
            let target = meta["_index"].as_str().or(index).unwrap_or("").to_string();
            let kind = meta["_type"].as_str().or(doc_type).unwrap_or("").to_string();
            let id = match meta["_id"].as_str() {
                Some(id) => id.to_string(),
                None => {
                    self.next_id += 1;
                    format!("auto-{}", self.next_id)
                }
            };

            let item = match action.as_str() {
                "index" | "create" => {
                    let source = lines
                        .next()
                        .and_then(|l| serde_json::from_str(l).ok())
                        .unwrap_or(Value::Null);
                    if action == "create" && self.doc(&target, &id).is_some() {
                        errors = true;
                        json!({"_index": target, "_type": kind, "_id": id, "status": 409,
                               "error": "DocumentAlreadyExistsException[document already exists]"})
                    } else {
                        let (version, created) = self.store(&target, &kind, &id, source);
                        json!({"_index": target, "_type": kind, "_id": id, "_version": version,
                               "status": if created { 201 } else { 200 }})
                    }
                }
                "update" => {
                    let envelope: Value = lines
                        .next()
                        .and_then(|l| serde_json::from_str(l).ok())
                        .unwrap_or(Value::Null);
                    match self.doc(&target, &id).cloned() {
                        Some(mut existing) => {
                            if let (Some(stored), Some(patch)) =
                                (existing.source.as_object_mut(), envelope["doc"].as_object())
                            {
                                for (k, v) in patch {
                                    stored.insert(k.clone(), v.clone());
                                }
                            }
                            let (version, _) = self.store(&target, &kind, &id, existing.source);
                            json!({"_index": target, "_type": kind, "_id": id,
                                   "_version": version, "status": 200})
                        }
                        None => {
                            errors = true;
                            json!({"_index": target, "_type": kind, "_id": id, "status": 404,
                                   "error": {"type": "document_missing_exception",
                                             "reason": format!("[{}][{}]: document missing", kind, id)}})
                        }
                    }
                }
                "delete" => {
                    let removed = self
                        .indices
                        .get_mut(&target)
                        .and_then(|docs| docs.remove(&id));
                    json!({"_index": target, "_type": kind, "_id": id,
                           "found": removed.is_some(),
                           "status": if removed.is_some() { 200 } else { 404 }})
                }
                other => {
                    return error(StatusCode::BAD_REQUEST, format!("unknown bulk action {}", other));
                }
            };
            let mut entry = Map::new();
            entry.insert(action, item);
            items.push(Value::Object(entry));
        }

        ok(json!({"took": 1, "errors": errors, "items": items}))
    }
}
