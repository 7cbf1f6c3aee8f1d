//! Mock definitions: a request predicate, a responder and a delay.

use crate::error::InterceptError;
use crate::matcher::{CompiledPattern, RequestPattern};
use crate::request::Request;
use crate::response::{ResponseOutcome, ResponseTemplate};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a mock answers a request.
pub type Predicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Produces the outcome for a matched request.
pub type Responder = Arc<dyn Fn(&Request) -> ResponseOutcome + Send + Sync>;

static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered mock. Unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockId(u64);

impl MockId {
    fn next() -> Self {
        MockId(NEXT_MOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock-{}", self.0)
    }
}

/// An immutable mock. Clones share the predicate and responder and keep
/// the same identity.
#[derive(Clone)]
pub struct MockSpec {
    id: MockId,
    name: Option<String>,
    predicate: Predicate,
    responder: Responder,
    delay: Duration,
}

impl MockSpec {
    pub fn new<P, R>(predicate: P, responder: R, delay: Duration) -> Self
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
        R: Fn(&Request) -> ResponseOutcome + Send + Sync + 'static,
    {
        Self {
            id: MockId::next(),
            name: None,
            predicate: Arc::new(predicate),
            responder: Arc::new(responder),
            delay,
        }
    }

    pub fn id(&self) -> MockId {
        self.id
    }

    /// Human-readable label, falling back to the id.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn matches(&self, request: &Request) -> bool {
        (self.predicate)(request)
    }

    pub fn respond(&self, request: &Request) -> ResponseOutcome {
        (self.responder)(request)
    }
}

impl PartialEq for MockSpec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MockSpec {}

impl fmt::Debug for MockSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Builder for [`MockSpec`].
///
/// ```
/// use mock_intercept::{Mock, ResponseTemplate};
/// use http::Method;
///
/// let spec = Mock::request(Method::GET, "http://localhost/get")
///     .respond_with(ResponseTemplate::new(200).json_body(serde_json::json!({"ok": true})))
///     .build();
/// assert_eq!(spec.delay(), std::time::Duration::ZERO);
/// ```
pub struct Mock {
    name: Option<String>,
    predicate: Predicate,
    responder: Responder,
    delay: Duration,
}

impl Mock {
    /// Match requests accepted by a compiled pattern.
    pub fn given(pattern: CompiledPattern) -> Self {
        let pattern = Arc::new(pattern);
        Self::when(move |req| pattern.matches(req))
    }

    /// Compile `pattern` and match the requests it accepts.
    pub fn try_given(pattern: RequestPattern) -> anyhow::Result<Self> {
        Ok(Self::given(pattern.compile()?))
    }

    /// Match an exact method and URL.
    pub fn request(method: http::Method, url: &str) -> Self {
        Self::given(CompiledPattern::exact(method, url))
    }

    /// Match with an arbitrary predicate.
    pub fn when<P>(predicate: P) -> Self
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        let empty = ResponseTemplate::new(200);
        Self {
            name: None,
            predicate: Arc::new(predicate),
            responder: Arc::new(move |req| empty.to_outcome(req)),
            delay: Duration::ZERO,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn respond_with(mut self, template: ResponseTemplate) -> Self {
        self.responder = Arc::new(move |req| template.to_outcome(req));
        self
    }

    pub fn respond_with_fn<R>(mut self, responder: R) -> Self
    where
        R: Fn(&Request) -> ResponseOutcome + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Answer every matched request with a failure.
    pub fn fail_with(mut self, error: InterceptError) -> Self {
        self.responder = Arc::new(move |_| ResponseOutcome::Failure(error.clone()));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> MockSpec {
        MockSpec {
            id: MockId::next(),
            name: self.name,
            predicate: self.predicate,
            responder: self.responder,
            delay: self.delay,
        }
    }
}
