//! Bulk actions and their line-delimited serialization

use crate::error::Result;
use crate::response::Body;
use serde::Serialize;
use serde_json::Value;

/// Metadata object on the command line of every action.
///
/// Fields are declared in alphabetical order of their wire names so the
/// serialized command is sorted; absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionMeta {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_index", skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_parent", skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "_retry_on_conflict", skip_serializing_if = "Option::is_none")]
    pub retry_on_conflict: Option<u32>,
    #[serde(rename = "_routing", skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(rename = "_timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "_ttl", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(rename = "_version_type", skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<bool>,
    /// Only meaningful for updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<Value>,
}

/// Setters shared by all action builders
macro_rules! meta_setters {
    () => {
        pub fn index(mut self, index: impl Into<String>) -> Self {
            self.meta.index = Some(index.into());
            self
        }

        pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
            self.meta.doc_type = Some(doc_type.into());
            self
        }

        pub fn id(mut self, id: impl Into<String>) -> Self {
            self.meta.id = Some(id.into());
            self
        }

        pub fn routing(mut self, routing: impl Into<String>) -> Self {
            self.meta.routing = Some(routing.into());
            self
        }

        pub fn parent(mut self, parent: impl Into<String>) -> Self {
            self.meta.parent = Some(parent.into());
            self
        }

        pub fn version(mut self, version: i64) -> Self {
            self.meta.version = Some(version);
            self
        }

        /// "internal", "external", "external_gte" or "force"
        pub fn version_type(mut self, version_type: impl Into<String>) -> Self {
            self.meta.version_type = Some(version_type.into());
            self
        }

        pub fn refresh(mut self, refresh: bool) -> Self {
            self.meta.refresh = Some(refresh);
            self
        }

        pub fn meta(&self) -> &ActionMeta {
            &self.meta
        }
    };
}

/// Index or create a document
#[derive(Debug, Clone, PartialEq)]
pub struct BulkIndexRequest {
    create: bool,
    meta: ActionMeta,
    doc: Option<Body>,
}

impl BulkIndexRequest {
    /// Index (create or overwrite) a document
    pub fn new() -> Self {
        Self {
            create: false,
            meta: ActionMeta::default(),
            doc: None,
        }
    }

    /// Create a document, failing if the id already exists
    pub fn create() -> Self {
        Self {
            create: true,
            ..Self::new()
        }
    }

    meta_setters!();

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.meta.timestamp = Some(timestamp.into());
        self
    }

    pub fn ttl(mut self, ttl: i64) -> Self {
        self.meta.ttl = Some(ttl);
        self
    }

    /// Document payload; raw strings and bytes are sent verbatim
    pub fn doc(mut self, doc: impl Into<Body>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    fn tag(&self) -> &'static str {
        if self.create {
            "create"
        } else {
            "index"
        }
    }
}

impl Default for BulkIndexRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial update of a document by `doc` merge or `script`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkUpdateRequest {
    meta: ActionMeta,
    doc: Option<Value>,
    doc_as_upsert: Option<bool>,
    script: Option<String>,
    script_lang: Option<String>,
    script_params: Option<Value>,
}

/// Second line of an update action, sorted by field name
#[derive(Debug, Serialize)]
struct UpdateEnvelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    doc: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_as_upsert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<&'a str>,
}

impl BulkUpdateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    meta_setters!();

    pub fn retry_on_conflict(mut self, retries: u32) -> Self {
        self.meta.retry_on_conflict = Some(retries);
        self
    }

    /// Partial document merged into the stored one; wins over `script`
    pub fn doc(mut self, doc: Value) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn doc_as_upsert(mut self, enabled: bool) -> Self {
        self.doc_as_upsert = Some(enabled);
        self
    }

    /// Document stored when the target does not exist yet
    pub fn upsert(mut self, upsert: Value) -> Self {
        self.meta.upsert = Some(upsert);
        self
    }

    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn script_lang(mut self, lang: impl Into<String>) -> Self {
        self.script_lang = Some(lang.into());
        self
    }

    pub fn script_params(mut self, params: Value) -> Self {
        self.script_params = Some(params);
        self
    }

    fn envelope(&self) -> UpdateEnvelope<'_> {
        if let Some(doc) = &self.doc {
            return UpdateEnvelope {
                doc: Some(doc),
                doc_as_upsert: self.doc_as_upsert,
                lang: None,
                params: None,
                script: None,
            };
        }
        UpdateEnvelope {
            doc: None,
            doc_as_upsert: self.doc_as_upsert,
            lang: self.script.as_ref().and(self.script_lang.as_deref()),
            params: self.script.as_ref().and(self.script_params.as_ref()),
            script: self.script.as_deref(),
        }
    }
}

/// Delete a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkDeleteRequest {
    meta: ActionMeta,
}

impl BulkDeleteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    meta_setters!();
}

/// One entry of a bulk buffer
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Index(BulkIndexRequest),
    Update(BulkUpdateRequest),
    Delete(BulkDeleteRequest),
}

impl BulkAction {
    /// Action name as used on the command line and in response items
    pub fn tag(&self) -> &'static str {
        match self {
            BulkAction::Index(r) => r.tag(),
            BulkAction::Update(_) => "update",
            BulkAction::Delete(_) => "delete",
        }
    }

    /// Serialized lines of this action, without trailing newlines
    pub fn lines(&self) -> Result<Vec<String>> {
        let (meta, second) = match self {
            BulkAction::Index(r) => {
                let doc = match &r.doc {
                    None => "{}".to_string(),
                    Some(Body::Raw(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
                    Some(Body::Json(value)) => serde_json::to_string(value)?,
                };
                (&r.meta, Some(doc))
            }
            BulkAction::Update(r) => (&r.meta, Some(serde_json::to_string(&r.envelope())?)),
            BulkAction::Delete(r) => (&r.meta, None),
        };

        let mut command = serde_json::Map::with_capacity(1);
        command.insert(self.tag().to_string(), serde_json::to_value(meta)?);

        let mut lines = vec![serde_json::to_string(&command)?];
        lines.extend(second);
        Ok(lines)
    }
}

impl From<BulkIndexRequest> for BulkAction {
    fn from(r: BulkIndexRequest) -> Self {
        BulkAction::Index(r)
    }
}

impl From<BulkUpdateRequest> for BulkAction {
    fn from(r: BulkUpdateRequest) -> Self {
        BulkAction::Update(r)
    }
}

impl From<BulkDeleteRequest> for BulkAction {
    fn from(r: BulkDeleteRequest) -> Self {
        BulkAction::Delete(r)
    }
}
