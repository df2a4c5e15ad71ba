//! Search results
//!
//! Only the envelope is modelled; aggregations and other sections of the
//! answer stay available as raw JSON in [`SearchResult::extra`].

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Answer of `_search` and `_search/scroll`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchResult {
    #[serde(default)]
    pub took: u64,
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits: Option<SearchHits>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SearchResult {
    /// Total number of matches reported by the server
    pub fn total_hits(&self) -> u64 {
        self.hits.as_ref().map_or(0, |h| h.total.value())
    }

    /// Hits on this page
    pub fn page(&self) -> &[SearchHit] {
        self.hits
            .as_ref()
            .map(|h| h.hits.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchHits {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// A bare count on older servers, an object on newer ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object {
        value: u64,
        #[serde(default)]
        relation: Relation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    #[default]
    Eq,
    Gte,
}

impl Default for TotalHits {
    fn default() -> Self {
        TotalHits::Count(0)
    }
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(n) => *n,
            TotalHits::Object { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchHit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl SearchHit {
    /// Deserialize `_source` into `T`; a missing source reads as `null`
    pub fn source_as<T: DeserializeOwned>(&self) -> Result<T> {
        let source = self.source.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(source)?)
    }
}
