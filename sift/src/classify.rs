//! Response classification
//!
//! Connectivity failures are handled by the dispatcher and mark nodes
//! dead. Everything that reaches this module completed a round-trip, so
//! failures here are protocol failures: a property of the request, never
//! of the node.

use crate::error::{Error, ProtocolError};
use crate::transport::HttpResponse;
use serde_json::Value;

/// Outcome of inspecting a completed round-trip
#[derive(Debug)]
pub enum Classification {
    /// Hand the response to the caller
    Success,
    /// Try again on another node without marking this one dead
    Retry(Error),
    /// Propagate to the caller immediately
    Fatal(Error),
}

impl Classification {
    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success)
    }
}

/// Classify a response.
///
/// 2xx and 404 are successes (404 means "absent" for exists/get calls), as
/// is any status listed in `ignore_statuses`. Statuses listed in
/// `retry_statuses` are retryable. Everything else is fatal.
pub fn classify(
    response: &HttpResponse,
    ignore_statuses: &[u16],
    retry_statuses: &[u16],
) -> Classification {
    let status = response.status;
    if (200..300).contains(&status) || status == 404 || ignore_statuses.contains(&status) {
        return Classification::Success;
    }

    let err = Error::Protocol(error_from_body(status, &response.body));
    if retry_statuses.contains(&status) {
        Classification::Retry(err)
    } else {
        Classification::Fatal(err)
    }
}

/// Build a protocol error from a failed response.
///
/// Understands `{"status": <int>, "error": <string>}` as well as the
/// structured form where `error` is an object carrying a `reason`. The
/// status in the body wins over the HTTP status when present.
pub fn error_from_body(http_status: u16, body: &[u8]) -> ProtocolError {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return ProtocolError::new(http_status, None);
    };

    let message = match value.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("reason")
            .and_then(|r| r.as_str())
            .map(|r| r.to_string()),
        _ => None,
    };

    match message.filter(|m| !m.is_empty()) {
        Some(message) => {
            let status = value
                .get("status")
                .and_then(|s| s.as_u64())
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(http_status);
            ProtocolError::new(status, Some(message))
        }
        None => ProtocolError::new(http_status, None),
    }
}
