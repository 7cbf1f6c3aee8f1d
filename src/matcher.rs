//! Request matching logic.
//!
//! [`resolve`] picks the mock answering a request. [`RequestPattern`] is the
//! declarative predicate used by the builder and by YAML mock files.

use crate::mock::MockSpec;
use crate::request::Request;
use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Return the first mock, in registration order, accepting `request`.
///
/// First registered wins when several mocks match. This is intentional:
/// overriding a generic mock means unregistering it, not registering a more
/// specific one after it.
pub fn resolve<'a>(request: &Request, specs: &'a [MockSpec]) -> Option<&'a MockSpec> {
    specs.iter().find(|spec| spec.matches(request))
}

/// Declarative request predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestPattern {
    /// HTTP method(s) to match (empty = any)
    #[serde(default)]
    pub method: Vec<String>,

    /// URL matching
    #[serde(default)]
    pub url: Option<UrlMatcher>,

    /// Query parameter matching
    #[serde(default)]
    pub query: HashMap<String, QueryMatcher>,

    /// Header matching (names are case-insensitive)
    #[serde(default)]
    pub headers: HashMap<String, HeaderMatcher>,

    /// Body matching
    #[serde(default)]
    pub body: Option<BodyMatcher>,
}

/// URL matching. `template` applies to the URL path, the others to the
/// full URL string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UrlMatcher {
    Exact { value: String },
    Prefix { value: String },
    Regex { pattern: String },
    Glob { pattern: String },
    /// Path with parameters (e.g., /users/{id})
    Template { template: String },
}

/// Query parameter matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryMatcher {
    Exact { value: String },
    Regex { pattern: String },
    Present,
    Absent,
}

/// Header matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderMatcher {
    Exact { value: String },
    Regex { pattern: String },
    Present,
    Absent,
    Contains { value: String },
}

/// Body matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcher {
    Exact { value: String },
    Regex { pattern: String },
    Contains { value: String },
    /// Body must be valid JSON (any structure)
    Json,
    /// Body must be absent or empty
    Empty,
}

impl RequestPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method.push(method.into());
        self
    }

    pub fn url(mut self, matcher: UrlMatcher) -> Self {
        self.url = Some(matcher);
        self
    }

    pub fn url_exact(self, url: impl Into<String>) -> Self {
        self.url(UrlMatcher::Exact { value: url.into() })
    }

    pub fn header(mut self, name: impl Into<String>, matcher: HeaderMatcher) -> Self {
        self.headers.insert(name.into(), matcher);
        self
    }

    pub fn query(mut self, name: impl Into<String>, matcher: QueryMatcher) -> Self {
        self.query.insert(name.into(), matcher);
        self
    }

    pub fn body(mut self, matcher: BodyMatcher) -> Self {
        self.body = Some(matcher);
        self
    }

    /// Compile regexes and globs.
    pub fn compile(&self) -> anyhow::Result<CompiledPattern> {
        let methods = self
            .method
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_uppercase().as_bytes())
                    .map_err(|e| anyhow::anyhow!("Invalid method {:?}: {}", m, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let url = self.url.as_ref().map(compile_url).transpose()?;

        let query = self
            .query
            .iter()
            .map(|(name, qm)| {
                let compiled = match qm {
                    QueryMatcher::Exact { value } => ValueMatcher::Exact(value.clone()),
                    QueryMatcher::Regex { pattern } => ValueMatcher::Regex(compile_regex(pattern)?),
                    QueryMatcher::Present => ValueMatcher::Present,
                    QueryMatcher::Absent => ValueMatcher::Absent,
                };
                Ok((name.clone(), compiled))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let headers = self
            .headers
            .iter()
            .map(|(name, hm)| {
                let compiled = match hm {
                    HeaderMatcher::Exact { value } => ValueMatcher::Exact(value.clone()),
                    HeaderMatcher::Regex { pattern } => {
                        ValueMatcher::Regex(compile_regex(pattern)?)
                    }
                    HeaderMatcher::Present => ValueMatcher::Present,
                    HeaderMatcher::Absent => ValueMatcher::Absent,
                    HeaderMatcher::Contains { value } => ValueMatcher::Contains(value.clone()),
                };
                Ok((name.clone(), compiled))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let body = match &self.body {
            None => None,
            Some(BodyMatcher::Exact { value }) => Some(CompiledBodyMatcher::Exact(value.clone())),
            Some(BodyMatcher::Regex { pattern }) => {
                Some(CompiledBodyMatcher::Regex(compile_regex(pattern)?))
            }
            Some(BodyMatcher::Contains { value }) => {
                Some(CompiledBodyMatcher::Contains(value.clone()))
            }
            Some(BodyMatcher::Json) => Some(CompiledBodyMatcher::Json),
            Some(BodyMatcher::Empty) => Some(CompiledBodyMatcher::Empty),
        };

        Ok(CompiledPattern {
            methods,
            url,
            query,
            headers,
            body,
        })
    }
}

fn compile_regex(pattern: &str) -> anyhow::Result<Regex> {
    Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))
}

fn compile_url(matcher: &UrlMatcher) -> anyhow::Result<CompiledUrlMatcher> {
    Ok(match matcher {
        UrlMatcher::Exact { value } => CompiledUrlMatcher::Exact(normalize_url(value)),
        UrlMatcher::Prefix { value } => CompiledUrlMatcher::Prefix(value.clone()),
        UrlMatcher::Regex { pattern } => CompiledUrlMatcher::Regex(compile_regex(pattern)?),
        UrlMatcher::Glob { pattern } => {
            let glob =
                globset::Glob::new(pattern).map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?;
            CompiledUrlMatcher::Glob(glob.compile_matcher())
        }
        UrlMatcher::Template { template } => {
            CompiledUrlMatcher::Template(PathTemplate::parse(template))
        }
    })
}

/// `http://localhost` and `http://localhost/` are the same URL once parsed.
fn normalize_url(value: &str) -> String {
    Url::parse(value)
        .map(String::from)
        .unwrap_or_else(|_| value.to_string())
}

/// Context captured during matching (for template variables).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchContext {
    /// Path parameters extracted from template matching
    pub path_params: HashMap<String, String>,
    /// Regex capture groups
    pub captures: HashMap<String, String>,
}

/// A [`RequestPattern`] ready for matching.
#[derive(Debug)]
pub struct CompiledPattern {
    methods: Vec<Method>,
    url: Option<CompiledUrlMatcher>,
    query: Vec<(String, ValueMatcher)>,
    headers: Vec<(String, ValueMatcher)>,
    body: Option<CompiledBodyMatcher>,
}

#[derive(Debug)]
enum CompiledUrlMatcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
    Template(PathTemplate),
}

#[derive(Debug)]
enum ValueMatcher {
    Exact(String),
    Regex(Regex),
    Present,
    Absent,
    Contains(String),
}

impl ValueMatcher {
    fn accepts(&self, value: Option<&str>) -> bool {
        match self {
            ValueMatcher::Exact(expected) => value == Some(expected.as_str()),
            ValueMatcher::Regex(regex) => value.map(|v| regex.is_match(v)).unwrap_or(false),
            ValueMatcher::Present => value.is_some(),
            ValueMatcher::Absent => value.is_none(),
            ValueMatcher::Contains(needle) => {
                value.map(|v| v.contains(needle.as_str())).unwrap_or(false)
            }
        }
    }
}

#[derive(Debug)]
enum CompiledBodyMatcher {
    Exact(String),
    Regex(Regex),
    Contains(String),
    Json,
    Empty,
}

impl CompiledPattern {
    /// Exact method and URL; nothing to compile, so this cannot fail.
    pub fn exact(method: Method, url: &str) -> Self {
        Self {
            methods: vec![method],
            url: Some(CompiledUrlMatcher::Exact(normalize_url(url))),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.match_context(request).is_some()
    }

    /// Match and return the values captured from the URL.
    pub fn match_context(&self, request: &Request) -> Option<MatchContext> {
        let mut context = MatchContext::default();

        if !self.methods.is_empty() && !self.methods.contains(&request.method) {
            return None;
        }

        if let Some(url_matcher) = &self.url {
            if !matches_url(url_matcher, &request.url, &mut context) {
                return None;
            }
        }

        if !self.query.is_empty() {
            let params = request.query_params();
            for (name, vm) in &self.query {
                if !vm.accepts(params.get(name).map(String::as_str)) {
                    return None;
                }
            }
        }

        for (name, vm) in &self.headers {
            if !vm.accepts(request.header(name)) {
                return None;
            }
        }

        if let Some(bm) = &self.body {
            if !matches_body(request, bm) {
                return None;
            }
        }

        Some(context)
    }
}

fn matches_url(matcher: &CompiledUrlMatcher, url: &Url, context: &mut MatchContext) -> bool {
    match matcher {
        CompiledUrlMatcher::Exact(value) => url.as_str() == value,
        CompiledUrlMatcher::Prefix(value) => url.as_str().starts_with(value.as_str()),
        CompiledUrlMatcher::Regex(regex) => {
            let Some(captures) = regex.captures(url.as_str()) else {
                return false;
            };
            for (i, cap) in captures.iter().enumerate().skip(1) {
                if let Some(m) = cap {
                    context.captures.insert(i.to_string(), m.as_str().to_string());
                }
            }
            for name in regex.capture_names().flatten() {
                if let Some(m) = captures.name(name) {
                    context.captures.insert(name.to_string(), m.as_str().to_string());
                }
            }
            true
        }
        CompiledUrlMatcher::Glob(glob) => glob.is_match(url.as_str()),
        CompiledUrlMatcher::Template(template) => match template.matches(url.path()) {
            Some(params) => {
                context.path_params = params;
                true
            }
            None => false,
        },
    }
}

fn matches_body(request: &Request, matcher: &CompiledBodyMatcher) -> bool {
    let body_str = request.body_str();

    match matcher {
        CompiledBodyMatcher::Exact(value) => body_str == Some(value.as_str()),
        CompiledBodyMatcher::Regex(regex) => body_str.map(|b| regex.is_match(b)).unwrap_or(false),
        CompiledBodyMatcher::Contains(value) => {
            body_str.map(|b| b.contains(value.as_str())).unwrap_or(false)
        }
        CompiledBodyMatcher::Json => body_str
            .map(|b| serde_json::from_str::<serde_json::Value>(b).is_ok())
            .unwrap_or(false),
        CompiledBodyMatcher::Empty => request.body.as_ref().map(|b| b.is_empty()).unwrap_or(true),
    }
}

#[derive(Debug)]
struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

#[derive(Debug)]
enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_param = false;

        for ch in template.chars() {
            match ch {
                '{' if !in_param => {
                    if !current.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut current)));
                    }
                    in_param = true;
                }
                '}' if in_param => {
                    segments.push(TemplateSegment::Param(std::mem::take(&mut current)));
                    in_param = false;
                }
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            segments.push(TemplateSegment::Literal(current));
        }

        Self { segments }
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut remaining = path;

        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                TemplateSegment::Literal(lit) => {
                    remaining = remaining.strip_prefix(lit.as_str())?;
                }
                TemplateSegment::Param(name) => {
                    // A parameter runs up to the next literal, or to the next slash
                    let end_pos = match self.segments.get(idx + 1) {
                        Some(TemplateSegment::Literal(next_lit)) => {
                            remaining.find(next_lit.as_str()).unwrap_or(remaining.len())
                        }
                        _ => remaining.find('/').unwrap_or(remaining.len()),
                    };

                    if end_pos == 0 {
                        return None;
                    }

                    params.insert(name.clone(), remaining[..end_pos].to_string());
                    remaining = &remaining[end_pos..];
                }
            }
        }

        // Must consume entire path
        remaining.is_empty().then_some(params)
    }
}
