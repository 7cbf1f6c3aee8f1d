//! In-process HTTP request interception for tests.
//!
//! Registers mocks that answer outgoing requests with canned responses
//! instead of touching the network. Every request sent through an
//! [`HttpClient`] is offered to the installed hooks first; the registry's
//! hook claims a request when a mock matches and answers it after the
//! mock's simulated delay.
//!
//! # Features
//!
//! - **Request Matching**: Match by method, URL, headers, query params, body
//! - **Ordered Priority**: First registered mock wins
//! - **Latency Simulation**: Fixed or jittered delays, delivered off the caller's task
//! - **Failure Injection**: Timeouts, refused and reset connections
//! - **Dynamic Templates**: Handlebars bodies rendered from the request
//! - **Mock Files**: Load mocks from YAML
//!
//! # Example
//!
//! ```
//! use mock_intercept::{ClientConfig, HttpClient, InterceptionRegistry, Mock, Request, ResponseTemplate};
//! use http::Method;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = Arc::new(ClientConfig::new());
//! let registry = InterceptionRegistry::new(Arc::clone(&config));
//! registry.register(
//!     Mock::request(Method::GET, "http://localhost/hello")
//!         .respond_with(ResponseTemplate::new(200).text_body("Hello, World!"))
//!         .build(),
//! );
//!
//! let client = HttpClient::with_config(config);
//! let res = client.send(Request::get("http://localhost/hello").unwrap()).await.unwrap();
//! assert_eq!(res.text().unwrap(), "Hello, World!");
//!
//! registry.reset();
//! # }
//! ```
//!
//! # Global state
//!
//! [`register`], [`unregister`] and [`reset_all`] act on
//! [`InterceptionRegistry::global`], which installs into
//! [`ClientConfig::shared`]. That affects every [`HttpClient::new`] in the
//! process. Tests sharing it must not run concurrently; call [`reset_all`]
//! when each test ends.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hook;
pub mod matcher;
pub mod mock;
pub mod registry;
pub mod request;
pub mod response;
pub mod template;

pub use client::{ClientConfig, HttpClient, InFlight, InterceptHook, Response, ResponseSink, Transport};
pub use config::MockFileConfig;
pub use error::{DeliveryError, FailureKind, InterceptError};
pub use matcher::RequestPattern;
pub use mock::{Mock, MockId, MockSpec};
pub use registry::{InterceptStats, InterceptionRegistry, RegistrySettings};
pub use request::Request;
pub use response::{Body, CachePolicy, ResponseMetadata, ResponseOutcome, ResponseTemplate};

use std::time::Duration;

/// Register a mock on the global registry.
pub fn register<P, R>(predicate: P, responder: R, delay: Duration) -> MockSpec
where
    P: Fn(&Request) -> bool + Send + Sync + 'static,
    R: Fn(&Request) -> ResponseOutcome + Send + Sync + 'static,
{
    InterceptionRegistry::global().register(MockSpec::new(predicate, responder, delay))
}

/// Remove a mock from the global registry.
pub fn unregister(token: &MockSpec) -> bool {
    InterceptionRegistry::global().unregister(token)
}

/// Remove every global mock and uninstall the global hook.
pub fn reset_all() {
    InterceptionRegistry::global().reset();
}
