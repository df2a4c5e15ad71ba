//! Scrolled retrieval of large result sets
//!
//! ```text
//!   [New] --open--> [Open, page=0] --next--> [Open, page>=1] --next(empty)--> [Exhausted]
//!                                            \--next(hits)--> [Open, page>=1]
//! ```
//!
//! A cursor without a scroll id fails with [`Error::MissingScrollId`]; an
//! exhausted one answers [`Error::EndOfStream`] forever. The server-side
//! context is released by [`ScrollCursor::clear`], or on drop when
//! [`ScrollService::release_on_drop`] is enabled.

use crate::client::{Client, PerformRequest};
use crate::error::{Error, Result};
use crate::response::Body;
use crate::search::{SearchHit, SearchResult};
use async_stream::try_stream;
use futures::Stream;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Default lifetime of the server-side context between two fetches
pub const DEFAULT_KEEP_ALIVE: &str = "5m";

/// Configures and opens a scroll
#[derive(Debug)]
pub struct ScrollService {
    client: Client,
    indices: Vec<String>,
    types: Vec<String>,
    query: Option<Value>,
    size: Option<usize>,
    keep_alive: String,
    scan: bool,
    release_on_drop: bool,
}

impl Client {
    /// Scroll over the given indices (all indices when empty)
    pub fn scroll<S: Into<String>>(&self, indices: impl IntoIterator<Item = S>) -> ScrollService {
        ScrollService::new(self.clone()).indices(indices)
    }

    /// Release server-side scroll contexts
    pub async fn clear_scroll<S: AsRef<str>>(&self, scroll_ids: &[S]) -> Result<()> {
        let ids: Vec<&str> = scroll_ids.iter().map(|s| s.as_ref()).collect();
        let request = PerformRequest::new(Method::DELETE, "/_search/scroll")
            .body(json!({ "scroll_id": ids }));
        self.execute(request).await?;
        Ok(())
    }
}

impl ScrollService {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
            types: Vec::new(),
            query: None,
            size: None,
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            scan: true,
            release_on_drop: false,
        }
    }

    pub fn indices<S: Into<String>>(mut self, indices: impl IntoIterator<Item = S>) -> Self {
        self.indices.extend(indices.into_iter().map(Into::into));
        self
    }

    pub fn types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Query clause; matches all documents when unset
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Hits per shard and page
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Context lifetime, e.g. "1m"; renewed on every fetch
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    /// Scan (unsorted, empty first page) or plain scroll
    pub fn scan(mut self, scan: bool) -> Self {
        self.scan = scan;
        self
    }

    /// Release the server context when an uncleared cursor is dropped
    pub fn release_on_drop(mut self, enabled: bool) -> Self {
        self.release_on_drop = enabled;
        self
    }

    fn path(&self) -> String {
        let mut path = String::from("/");
        if !self.indices.is_empty() {
            path.push_str(&self.indices.join(","));
            path.push('/');
        }
        if !self.types.is_empty() {
            path.push_str(&self.types.join(","));
            path.push('/');
        }
        path.push_str("_search");
        path
    }

    /// Open the server-side context
    pub async fn open(self) -> Result<ScrollCursor> {
        let query = self
            .query
            .clone()
            .unwrap_or_else(|| json!({ "match_all": {} }));

        let mut request = PerformRequest::new(Method::POST, self.path())
            .body(json!({ "query": query }));
        if self.scan {
            request = request.param("search_type", "scan");
        }
        request = request.param("scroll", self.keep_alive.clone());
        if let Some(size) = self.size {
            request = request.param("size", size.to_string());
        }

        let response = self.client.execute(request).await?;
        let result: SearchResult = response.decode()?;
        let scroll_id = result
            .scroll_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingScrollId)?;

        debug!(total = result.total_hits(), scan = self.scan, "Scroll opened");

        Ok(ScrollCursor {
            client: self.client,
            scroll_id: Some(scroll_id),
            keep_alive: self.keep_alive,
            pages: 0,
            total_hits: result.total_hits(),
            first_page: if self.scan { None } else { Some(result) },
            exhausted: false,
            cleared: false,
            release_on_drop: self.release_on_drop,
        })
    }
}

/// Stateful iterator over a server-held result context
pub struct ScrollCursor {
    client: Client,
    scroll_id: Option<String>,
    keep_alive: String,
    pages: usize,
    total_hits: u64,
    first_page: Option<SearchResult>,
    exhausted: bool,
    cleared: bool,
    release_on_drop: bool,
}

impl ScrollCursor {
    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    /// Pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Total matches reported when the scroll was opened
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page, renewing the context lease.
    ///
    /// Returns [`Error::EndOfStream`] once a page comes back empty, and on
    /// every call after that.
    pub async fn next(&mut self) -> Result<SearchResult> {
        if self.exhausted {
            return Err(Error::EndOfStream);
        }

        let result = match self.first_page.take() {
            Some(result) => result,
            None => {
                let scroll_id = self
                    .scroll_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .ok_or(Error::MissingScrollId)?;
                let request = PerformRequest::new(Method::POST, "/_search/scroll")
                    .param("scroll", self.keep_alive.clone())
                    .body(Body::from(scroll_id));
                let result: SearchResult = self.client.execute(request).await?.decode()?;
                self.scroll_id = result.scroll_id.clone();
                result
            }
        };
        self.pages += 1;

        if result.page().is_empty() || result.total_hits() == 0 {
            debug!(pages = self.pages, "Scroll exhausted");
            self.exhausted = true;
            return Err(Error::EndOfStream);
        }
        Ok(result)
    }

    /// Individual hits across all remaining pages
    pub fn into_stream(mut self) -> impl Stream<Item = Result<SearchHit>> {
        try_stream! {
            loop {
                match self.next().await {
                    Ok(page) => {
                        for hit in page.hits.map(|h| h.hits).unwrap_or_default() {
                            yield hit;
                        }
                    }
                    Err(Error::EndOfStream) => break,
                    Err(e) => Err(e)?,
                }
            }
        }
    }

    /// Release the server-side context. The cursor is exhausted afterwards.
    pub async fn clear(&mut self) -> Result<()> {
        if let Some(scroll_id) = self.scroll_id.clone() {
            self.client.clear_scroll(&[scroll_id]).await?;
        }
        self.cleared = true;
        self.exhausted = true;
        self.first_page = None;
        Ok(())
    }
}

impl Drop for ScrollCursor {
    fn drop(&mut self) {
        if !self.release_on_drop || self.cleared {
            return;
        }
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                handle.spawn(async move {
                    if let Err(e) = client.clear_scroll(&[scroll_id]).await {
                        debug!("Releasing scroll on drop failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("Scroll dropped outside a runtime; context not released"),
        }
    }
}

impl std::fmt::Debug for ScrollCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollCursor")
            .field("scroll_id", &self.scroll_id)
            .field("pages", &self.pages)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
