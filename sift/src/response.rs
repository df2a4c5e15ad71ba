//! Request bodies, responses and response decoding

use crate::error::Result;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Request body accepted by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Already serialized JSON, sent verbatim
    Raw(Bytes),
    /// Structured value, JSON-serialized before sending
    Json(serde_json::Value),
}

impl Body {
    /// Serialize any value into a structured body
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    pub(crate) fn into_bytes(self) -> Result<Bytes> {
        match self {
            Body::Raw(bytes) => Ok(bytes),
            Body::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Raw(Bytes::from(s))
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Raw(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Raw(Bytes::from(v))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Raw(b)
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Body::Json(v)
    }
}

/// Decodes response bytes into a JSON tree
pub trait Decoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<serde_json::Value>;
}

/// Default decoder using `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, data: &[u8]) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Result of a successful round-trip
#[derive(Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    decoder: Arc<dyn Decoder>,
}

impl Response {
    pub fn new(status: u16, headers: HeaderMap, body: Bytes, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            status,
            headers,
            body,
            decoder,
        }
    }

    /// Decode the body into `T` through the configured decoder
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.decoder.decode(&self.body)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Body as text, lossily converted
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}
