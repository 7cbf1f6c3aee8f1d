//! The hook a registry installs into the host client.

use crate::client::{InFlight, InterceptHook, ResponseSink};
use crate::dispatcher::{InterceptionContext, ResponseDispatcher};
use crate::error::InterceptError;
use crate::registry::{RegistryInner, HOOK_NAME};
use crate::request::Request;
use crate::response::ResponseOutcome;
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

/// Claims requests for which the registry resolves a mock.
///
/// Holds the registry weakly: once every registry handle is gone the hook
/// declines everything.
pub struct MockHook {
    registry: Weak<RegistryInner>,
    dispatcher: ResponseDispatcher,
}

impl MockHook {
    pub(crate) fn new(registry: Weak<RegistryInner>) -> Self {
        Self {
            registry,
            dispatcher: ResponseDispatcher::new(),
        }
    }
}

impl InterceptHook for MockHook {
    fn name(&self) -> &str {
        HOOK_NAME
    }

    fn can_handle(&self, request: &Request) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.resolve(request).is_some())
            .unwrap_or(false)
    }

    fn handle(&self, request: Request, sink: Arc<dyn ResponseSink>) -> Arc<dyn InFlight> {
        let context = InterceptionContext::new(&request, sink);

        // Resolve again: the registry may have changed since can_handle
        let Some(registry) = self.registry.upgrade() else {
            fail_unmatched(&context, &request);
            return context;
        };

        match registry.resolve(&request) {
            Some(spec) => {
                registry.record(true);
                if registry.settings().log_matches {
                    info!(
                        mock = %spec.label(),
                        method = %request.method,
                        url = %request.url,
                        "Request matched mock"
                    );
                }
                if let Err(err) = self.dispatcher.dispatch(&spec, &request, &context) {
                    error!(context = context.id(), error = %err, "Failed to dispatch mock response");
                }
            }
            None => {
                registry.record(false);
                if registry.settings().log_unmatched {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        "No mock registered for request"
                    );
                }
                fail_unmatched(&context, &request);
            }
        }

        context
    }
}

fn fail_unmatched(context: &InterceptionContext, request: &Request) {
    let outcome = ResponseOutcome::Failure(InterceptError::NoMockFound {
        method: request.method.clone(),
        url: request.url.clone(),
    });
    if let Err(err) = context.deliver(outcome) {
        error!(context = context.id(), error = %err, "Failed to deliver not-found");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, HttpClient};
    use crate::dispatcher::tests::{RecordingSink, Signal};
    use crate::mock::Mock;
    use crate::registry::{InterceptStats, InterceptionRegistry};
    use crate::response::{CachePolicy, ResponseMetadata, ResponseTemplate};
    use bytes::Bytes;
    use http::Method;
    use std::time::Duration;

    fn setup() -> (InterceptionRegistry, HttpClient) {
        let config = Arc::new(ClientConfig::new());
        let registry = InterceptionRegistry::new(Arc::clone(&config));
        (registry, HttpClient::with_config(config))
    }

    #[tokio::test]
    async fn test_matched_request_is_answered() {
        let (registry, client) = setup();
        registry.register(
            Mock::request(Method::POST, "http://localhost/post")
                .respond_with(
                    ResponseTemplate::new(201)
                        .json_body(serde_json::json!({"message": "testPostRequest"})),
                )
                .build(),
        );

        let res = client
            .send(Request::post("http://localhost/post").unwrap())
            .await
            .unwrap();
        assert_eq!(res.status, 201);
        assert_eq!(res.url.as_str(), "http://localhost/post");
        let body: serde_json::Value = res.json().unwrap();
        assert_eq!(body["message"], "testPostRequest");
        assert_eq!(
            registry.stats(),
            InterceptStats {
                requests_total: 1,
                requests_matched: 1,
                requests_unmatched: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_unmatched_request_falls_through() {
        let (registry, client) = setup();
        registry.register(Mock::request(Method::GET, "http://localhost/a").build());

        let err = client
            .send(Request::get("http://localhost/b").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, InterceptError::Offline { .. }));
        assert_eq!(registry.stats().requests_total, 0);
    }

    #[tokio::test]
    async fn test_registry_changed_between_claim_and_handle() {
        let (registry, _client) = setup();
        let spec = registry.register(Mock::request(Method::GET, "http://localhost/a").build());
        let hook = registry.config().hooks().remove(0);
        let req = Request::get("http://localhost/a").unwrap();

        assert!(hook.can_handle(&req));
        registry.unregister(&spec);

        let (sink, mut rx) = RecordingSink::new();
        let _in_flight = hook.handle(req.clone(), sink);
        assert_eq!(
            rx.recv().await,
            Some(Signal::Failed(InterceptError::NoMockFound {
                method: Method::GET,
                url: req.url.clone(),
            }))
        );
        assert_eq!(registry.stats().requests_unmatched, 1);
    }

    #[tokio::test]
    async fn test_cancel_through_in_flight() {
        let (registry, _client) = setup();
        registry.register(
            Mock::when(|_| true)
                .delay(Duration::from_millis(50))
                .build(),
        );
        let hook = registry.config().hooks().remove(0);

        let (sink, mut rx) = RecordingSink::new();
        let in_flight = hook.handle(Request::get("http://localhost/").unwrap(), sink);
        in_flight.cancel();
        in_flight.cancel();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());
    }

    /// Forwards to another hook and copies every signal into a recorder.
    struct Tap {
        inner: Arc<dyn InterceptHook>,
        recorder: Arc<RecordingSink>,
    }

    struct TapSink {
        inner: Arc<dyn ResponseSink>,
        recorder: Arc<RecordingSink>,
    }

    impl ResponseSink for TapSink {
        fn did_receive_response(&self, metadata: ResponseMetadata, cache_policy: CachePolicy) {
            self.recorder
                .did_receive_response(metadata.clone(), cache_policy);
            self.inner.did_receive_response(metadata, cache_policy);
        }

        fn did_load(&self, data: Bytes) {
            self.recorder.did_load(data.clone());
            self.inner.did_load(data);
        }

        fn did_finish(&self) {
            self.recorder.did_finish();
            self.inner.did_finish();
        }

        fn did_fail(&self, error: InterceptError) {
            self.recorder.did_fail(error.clone());
            self.inner.did_fail(error);
        }
    }

    impl InterceptHook for Tap {
        fn name(&self) -> &str {
            "tap"
        }

        fn can_handle(&self, request: &Request) -> bool {
            self.inner.can_handle(request)
        }

        fn handle(&self, request: Request, sink: Arc<dyn ResponseSink>) -> Arc<dyn InFlight> {
            let sink = Arc::new(TapSink {
                inner: sink,
                recorder: Arc::clone(&self.recorder),
            });
            self.inner.handle(request, sink)
        }
    }

    #[tokio::test]
    async fn test_client_timeout_suppresses_delayed_delivery() {
        let (registry, _client) = setup();
        registry.register(
            Mock::request(Method::GET, "http://localhost/slow")
                .respond_with(ResponseTemplate::new(200).text_body("late"))
                .delay(Duration::from_millis(150))
                .build(),
        );

        let (recorder, mut rx) = RecordingSink::new();
        let tapped = Arc::new(ClientConfig::new());
        tapped.install(Arc::new(Tap {
            inner: registry.config().hooks().remove(0),
            recorder,
        }));
        let client = HttpClient::with_config(tapped).with_timeout(Duration::from_millis(30));

        let err = client
            .send(Request::get("http://localhost/slow").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InterceptError::TimedOut {
                after: Duration::from_millis(30)
            }
        );
        assert_eq!(registry.stats().requests_matched, 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_delays_complete_independently() {
        let (registry, client) = setup();
        registry.register(
            Mock::request(Method::GET, "http://localhost/slow")
                .respond_with(ResponseTemplate::new(200).text_body("slow"))
                .delay(Duration::from_millis(150))
                .build(),
        );
        registry.register(
            Mock::request(Method::GET, "http://localhost/fast")
                .respond_with(ResponseTemplate::new(200).text_body("fast"))
                .delay(Duration::from_millis(10))
                .build(),
        );

        let client = Arc::new(client);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for path in ["slow", "fast"] {
            let client = Arc::clone(&client);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let url = format!("http://localhost/{path}");
                let res = client.send(Request::get(&url).unwrap()).await.unwrap();
                order.lock().push(res.text().unwrap().to_string());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock(), vec!["fast".to_string(), "slow".to_string()]);
    }
}
