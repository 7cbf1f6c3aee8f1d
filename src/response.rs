//! Response outcomes and the template used to produce them.

use crate::error::InterceptError;
use crate::request::Request;
use bytes::Bytes;
use http::StatusCode;
use std::collections::HashMap;
use url::Url;

/// Content type added by [`ResponseTemplate::json_body`].
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Cache policy announced with the response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Allowed,
    AllowedInMemoryOnly,
    NotAllowed,
}

/// Status line and headers of a synthetic response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMetadata {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
}

/// Whether a successful response carries bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Content(Bytes),
    Empty,
}

/// What a mock answers for a matched request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(ResponseMetadata, Body),
    Failure(InterceptError),
}

impl ResponseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ResponseOutcome::Failure(_))
    }
}

/// Declarative response: status, headers and an optional body.
///
/// [`ResponseTemplate::new`] panics on a status outside 100..=999. Use
/// [`ResponseTemplate::with_status`] or `ResponseTemplate::try_from(u16)`
/// when the code comes from input.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTemplate {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
}

impl TryFrom<u16> for ResponseTemplate {
    type Error = http::status::InvalidStatusCode;

    fn try_from(status: u16) -> Result<Self, Self::Error> {
        StatusCode::from_u16(status).map(Self::with_status)
    }
}

impl ResponseTemplate {
    /// Panics if `status` is not a valid HTTP status code.
    pub fn new(status: u16) -> Self {
        let status = StatusCode::from_u16(status)
            .unwrap_or_else(|_| panic!("invalid HTTP status code {status}"));
        Self::with_status(status)
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// JSON body; sets `Content-Type` unless one was given.
    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        if !self.has_header("content-type") {
            self.headers
                .insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
        }
        self.body = Some(Bytes::from(body.to_string()));
        self
    }

    pub fn text_body(self, body: impl Into<String>) -> Self {
        self.bytes_body(body.into())
    }

    pub fn bytes_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Build the outcome for `request`. A missing or zero-length body
    /// becomes [`Body::Empty`].
    pub fn to_outcome(&self, request: &Request) -> ResponseOutcome {
        let metadata = ResponseMetadata {
            url: request.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
        };
        let body = match &self.body {
            Some(bytes) if !bytes.is_empty() => Body::Content(bytes.clone()),
            _ => Body::Empty,
        };
        ResponseOutcome::Success(metadata, body)
    }
}
