//! Outgoing request as seen by the interception layer.

use bytes::Bytes;
use http::Method;
use std::collections::HashMap;
use url::Url;

/// An outgoing HTTP request.
///
/// Read-only to the interception layer: matching and responding only ever
/// borrow it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            method,
            url: Url::parse(url)?,
            headers: HashMap::new(),
            body: None,
        })
    }

    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Self::new(Method::GET, url)
    }

    pub fn post(url: &str) -> Result<Self, url::ParseError> {
        Self::new(Method::POST, url)
    }

    pub fn put(url: &str) -> Result<Self, url::ParseError> {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: &str) -> Result<Self, url::ParseError> {
        Self::new(Method::DELETE, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query parameters; later duplicates win.
    pub fn query_params(&self) -> HashMap<String, String> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Body as UTF-8 text, if it is text.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = Request::get("http://localhost/")
            .unwrap()
            .with_header("Content-Type", "text/plain");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_query_params_are_decoded() {
        let req = Request::get("http://localhost/search?name=John%20Doe&page=2").unwrap();
        let params = req.query_params();
        assert_eq!(params.get("name").map(String::as_str), Some("John Doe"));
        assert_eq!(params.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(Request::get("not a url").is_err());
    }
}
