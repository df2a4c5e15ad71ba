//! Bulk response items

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Body of a `_bulk` answer
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    /// One single-key object per action, keyed by action name
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkResponseItem>>,
}

/// Outcome of a single bulk action
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BulkResponseItem {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_version", default)]
    pub version: i64,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    /// A plain message on old servers, a structured cause on newer ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl BulkResponseItem {
    pub fn is_failed(&self) -> bool {
        !(200..300).contains(&self.status)
    }

    /// Error message, whatever shape the server used
    pub fn error_reason(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("reason")
                .and_then(|r| r.as_str())
                .map(|r| r.to_string())
                .or_else(|| Some(Value::Object(obj.clone()).to_string())),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl BulkResponse {
    pub fn indexed(&self) -> Vec<&BulkResponseItem> {
        self.by_action("index")
    }

    pub fn created(&self) -> Vec<&BulkResponseItem> {
        self.by_action("create")
    }

    pub fn updated(&self) -> Vec<&BulkResponseItem> {
        self.by_action("update")
    }

    pub fn deleted(&self) -> Vec<&BulkResponseItem> {
        self.by_action("delete")
    }

    /// Items of one action kind, in request order
    pub fn by_action(&self, action: &str) -> Vec<&BulkResponseItem> {
        self.items.iter().filter_map(|item| item.get(action)).collect()
    }

    /// Items for a document id, across action kinds
    pub fn by_id(&self, id: &str) -> Vec<&BulkResponseItem> {
        self.all().filter(|item| item.id == id).collect()
    }

    pub fn failed(&self) -> Vec<&BulkResponseItem> {
        self.all().filter(|item| item.is_failed()).collect()
    }

    pub fn succeeded(&self) -> Vec<&BulkResponseItem> {
        self.all().filter(|item| !item.is_failed()).collect()
    }

    fn all(&self) -> impl Iterator<Item = &BulkResponseItem> + '_ {
        self.items.iter().flat_map(|item| item.values())
    }
}
