//! Host HTTP client and its extensibility point.
//!
//! [`ClientConfig`] holds the hooks that may claim outgoing requests ahead of
//! the [`Transport`]. [`HttpClient`] asks them in install order and collects
//! the claimed hook's signals into a [`Response`].

use crate::error::{FailureKind, InterceptError};
use crate::request::Request;
use crate::response::{CachePolicy, ResponseMetadata};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

/// Callback surface through which a hook delivers a response.
///
/// A successful response is `did_receive_response`, optionally `did_load`,
/// then `did_finish`. A failed one is a lone `did_fail`.
pub trait ResponseSink: Send + Sync {
    fn did_receive_response(&self, metadata: ResponseMetadata, cache_policy: CachePolicy);
    fn did_load(&self, data: Bytes);
    fn did_finish(&self);
    fn did_fail(&self, error: InterceptError);
}

/// Handle to a request a hook is answering.
pub trait InFlight: Send + Sync {
    /// Stop delivery. Must be idempotent.
    fn cancel(&self);
}

/// Adapter that can claim requests before they reach the transport.
pub trait InterceptHook: Send + Sync {
    /// Identity used for install/uninstall.
    fn name(&self) -> &str;

    /// Whether this hook wants `request`.
    fn can_handle(&self, request: &Request) -> bool;

    /// Start answering `request` through `sink`.
    fn handle(&self, request: Request, sink: Arc<dyn ResponseSink>) -> Arc<dyn InFlight>;
}

/// Network fallback for requests no hook claims.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, InterceptError>;
}

/// Transport with no network: every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn execute(&self, request: Request) -> Result<Response, InterceptError> {
        Err(InterceptError::Offline { url: request.url })
    }
}

/// Ordered set of installed hooks.
///
/// The instance returned by [`ClientConfig::shared`] is process-wide:
/// installing into it affects every client built on it.
#[derive(Default)]
pub struct ClientConfig {
    hooks: RwLock<Vec<Arc<dyn InterceptHook>>>,
}

static SHARED_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide configuration.
    pub fn shared() -> Arc<ClientConfig> {
        Arc::clone(SHARED_CONFIG.get_or_init(|| Arc::new(ClientConfig::new())))
    }

    /// Append `hook` unless one with the same name is installed.
    pub fn install(&self, hook: Arc<dyn InterceptHook>) -> bool {
        let mut hooks = self.hooks.write();
        if hooks.iter().any(|h| h.name() == hook.name()) {
            return false;
        }
        debug!(hook = hook.name(), "Installing intercept hook");
        hooks.push(hook);
        true
    }

    pub fn uninstall(&self, name: &str) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|h| h.name() != name);
        let removed = hooks.len() != before;
        if removed {
            debug!(hook = name, "Uninstalled intercept hook");
        }
        removed
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.hooks.read().iter().any(|h| h.name() == name)
    }

    pub fn hooks(&self) -> Vec<Arc<dyn InterceptHook>> {
        self.hooks.read().clone()
    }

    /// First installed hook willing to take `request`.
    pub fn claim(&self, request: &Request) -> Option<Arc<dyn InterceptHook>> {
        // Snapshot first so hooks never run under the config lock
        self.hooks().into_iter().find(|h| h.can_handle(request))
    }
}

/// A fully received response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub cache_policy: CachePolicy,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Minimal host client that consults installed hooks before the transport.
pub struct HttpClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Client on the process-wide configuration with no network.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::shared())
    }

    pub fn with_config(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            transport: Arc::new(OfflineTransport),
            timeout: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Send `request`. Dropping the returned future cancels a claimed
    /// request.
    pub async fn send(&self, request: Request) -> Result<Response, InterceptError> {
        let Some(hook) = self.config.claim(&request) else {
            debug!(method = %request.method, url = %request.url, "No hook claimed request");
            return self.with_deadline(self.transport.execute(request)).await;
        };

        debug!(
            hook = hook.name(),
            method = %request.method,
            url = %request.url,
            "Request claimed by hook"
        );

        let (collector, rx) = Collector::new(request.url.clone());
        let guard = CancelOnDrop(hook.handle(request, collector));

        let result = self
            .with_deadline(async move { rx.await.unwrap_or(Err(InterceptError::Cancelled)) })
            .await;
        drop(guard);
        result
    }

    async fn with_deadline<F>(&self, fut: F) -> Result<Response, InterceptError>
    where
        F: std::future::Future<Output = Result<Response, InterceptError>>,
    {
        match self.timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .unwrap_or(Err(InterceptError::TimedOut { after })),
            None => fut.await,
        }
    }
}

struct CancelOnDrop(Arc<dyn InFlight>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

type Completion = oneshot::Sender<Result<Response, InterceptError>>;

/// Accumulates signals into a [`Response`].
struct Collector {
    url: Url,
    state: Mutex<CollectorState>,
}

#[derive(Default)]
struct CollectorState {
    head: Option<(ResponseMetadata, CachePolicy)>,
    body: BytesMut,
    done: Option<Completion>,
}

impl Collector {
    fn new(url: Url) -> (Arc<Self>, oneshot::Receiver<Result<Response, InterceptError>>) {
        let (tx, rx) = oneshot::channel();
        let collector = Self {
            url,
            state: Mutex::new(CollectorState {
                done: Some(tx),
                ..Default::default()
            }),
        };
        (Arc::new(collector), rx)
    }

    fn complete(&self, state: &mut CollectorState, result: Result<Response, InterceptError>) {
        match state.done.take() {
            // Receiver gone means the caller stopped waiting
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => warn!(url = %self.url, "Signal after response completed"),
        }
    }
}

impl ResponseSink for Collector {
    fn did_receive_response(&self, metadata: ResponseMetadata, cache_policy: CachePolicy) {
        let mut state = self.state.lock();
        if state.head.is_some() {
            warn!(url = %self.url, "Duplicate response metadata");
        }
        state.head = Some((metadata, cache_policy));
    }

    fn did_load(&self, data: Bytes) {
        self.state.lock().body.extend_from_slice(&data);
    }

    fn did_finish(&self) {
        let mut state = self.state.lock();
        let result = match state.head.take() {
            Some((meta, cache_policy)) => Ok(Response {
                url: meta.url,
                status: meta.status,
                headers: meta.headers,
                body: std::mem::take(&mut state.body).freeze(),
                cache_policy,
            }),
            None => Err(InterceptError::simulated(
                FailureKind::Other,
                "finished without response metadata",
            )),
        };
        self.complete(&mut state, result);
    }

    fn did_fail(&self, error: InterceptError) {
        let mut state = self.state.lock();
        self.complete(&mut state, Err(error));
    }
}
