//! Client error types

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the client
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid option value at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// No alive node after a full registry pass and a recovery health check
    #[error("No node available: {0}")]
    NoClient(String),

    /// The HTTP layer failed to complete a round-trip
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The round-trip succeeded but the status indicates failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The scroll cursor is exhausted
    #[error("End of stream")]
    EndOfStream,

    /// A scroll operation was attempted without a scroll id
    #[error("No scroll id")]
    MissingScrollId,

    /// A bulk submit was attempted with an empty buffer
    #[error("No bulk actions to commit")]
    NoBulkActions,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::NoClient(_) => "no_client",
            Error::Transport(_) => "transport",
            Error::Protocol(_) => "protocol",
            Error::Decode(_) => "decode",
            Error::EndOfStream => "end_of_stream",
            Error::MissingScrollId => "missing_scroll_id",
            Error::NoBulkActions => "no_bulk_actions",
            Error::Io(_) => "io",
        }
    }

    /// Whether the dispatcher may retry a request that failed with this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NoClient(_) | Error::Transport(_))
    }

    /// HTTP status carried by a protocol error
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Protocol(e) => Some(e.status),
            _ => None,
        }
    }

    /// True if the upstream reported 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

/// Failure of the HTTP transport to complete a request/response round-trip
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timeout: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: true,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

/// Error reported by the upstream service through a non-success status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// HTTP status (or the status from the error body, when present)
    pub status: u16,
    /// Upstream error message, if the body carried one
    pub message: Option<String>,
}

impl ProtocolError {
    pub fn new(status: u16, message: Option<String>) -> Self {
        Self { status, message }
    }

    /// Canonical reason phrase for the status code
    pub fn reason(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "Error {} ({}): {}", self.status, self.reason(), message),
            None => write!(f, "Error {} ({})", self.status, self.reason()),
        }
    }
}

impl std::error::Error for ProtocolError {}

pub type Result<T> = std::result::Result<T, Error>;
