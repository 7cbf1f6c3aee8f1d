//! Error types surfaced through the callback surface.

use http::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Kind of network failure a mock can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionRefused => "connection refused",
            FailureKind::ConnectionReset => "connection reset",
            FailureKind::Other => "error",
        };
        f.write_str(s)
    }
}

/// Errors delivered to the caller as a failed request.
///
/// Every variant reaches application code through the same `did_fail`
/// signal a real network failure would use.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterceptError {
    /// The hook claimed the request but no mock resolved for it.
    #[error("no mock registered for {method} {url}")]
    NoMockFound { method: Method, url: Url },

    /// A mock deliberately answered with a simulated failure.
    #[error("simulated {kind}: {message}")]
    Simulated { kind: FailureKind, message: String },

    /// No hook claimed the request and the transport has no network.
    #[error("network access disabled for {url}")]
    Offline { url: Url },

    /// The host client gave up waiting.
    #[error("request timed out after {after:?}")]
    TimedOut { after: Duration },

    /// The interception was torn down before a terminal signal arrived.
    #[error("request cancelled")]
    Cancelled,
}

impl InterceptError {
    /// Shorthand for a simulated failure.
    pub fn simulated(kind: FailureKind, message: impl Into<String>) -> Self {
        InterceptError::Simulated {
            kind,
            message: message.into(),
        }
    }
}

/// Misuse of an interception context.
///
/// These never reach the sink: once a context is delivering, terminal or
/// cancelled there is nobody left to tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("context already past delivery (state {0:?})")]
    AlreadyDelivered(crate::dispatcher::DeliveryState),

    #[error("context was cancelled before delivery")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_mock_found_message() {
        let err = InterceptError::NoMockFound {
            method: Method::GET,
            url: Url::parse("http://localhost/missing").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "no mock registered for GET http://localhost/missing"
        );
    }

    #[test]
    fn test_simulated_message() {
        let err = InterceptError::simulated(FailureKind::ConnectionRefused, "port 80 closed");
        assert_eq!(err.to_string(), "simulated connection refused: port 80 closed");
    }
}
