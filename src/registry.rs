//! Registry of active mocks.
//!
//! Owns the ordered mock list and the lifecycle of the [`MockHook`] in a
//! [`ClientConfig`]. The first registration installs the hook; only
//! [`reset`](InterceptionRegistry::reset) removes it.
//!
//! The list sits behind a read-write lock: matching takes the read side and
//! always sees a whole list, registration takes the write side.

use crate::client::ClientConfig;
use crate::hook::MockHook;
use crate::matcher;
use crate::mock::{MockId, MockSpec};
use crate::request::Request;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Name under which the registry's hook is installed.
pub const HOOK_NAME: &str = "mock-intercept";

/// Logging switches for the installed hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Log every request answered by a mock
    pub log_matches: bool,
    /// Log requests the hook had to fail for lack of a mock
    pub log_unmatched: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

/// Request counters kept by the hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptStats {
    pub requests_total: u64,
    pub requests_matched: u64,
    pub requests_unmatched: u64,
}

#[derive(Default)]
struct RegistryState {
    mocks: Vec<MockSpec>,
    installed: bool,
}

pub(crate) struct RegistryInner {
    state: RwLock<RegistryState>,
    config: Arc<ClientConfig>,
    settings: RegistrySettings,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
}

impl RegistryInner {
    /// Predicates run on a snapshot, outside the lock, so they may touch
    /// the registry themselves.
    pub(crate) fn resolve(&self, request: &Request) -> Option<MockSpec> {
        let mocks = self.state.read().mocks.clone();
        matcher::resolve(request, &mocks).cloned()
    }

    pub(crate) fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub(crate) fn record(&self, matched: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.requests_matched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Shared handle to a mock registry. Clones share state.
#[derive(Clone)]
pub struct InterceptionRegistry {
    inner: Arc<RegistryInner>,
}

static GLOBAL_REGISTRY: OnceLock<InterceptionRegistry> = OnceLock::new();

impl InterceptionRegistry {
    /// Registry installing into `config`.
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self::with_settings(config, RegistrySettings::default())
    }

    pub fn with_settings(config: Arc<ClientConfig>, settings: RegistrySettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                config,
                settings,
                requests_total: AtomicU64::new(0),
                requests_matched: AtomicU64::new(0),
                requests_unmatched: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide registry, bound to [`ClientConfig::shared`].
    pub fn global() -> InterceptionRegistry {
        GLOBAL_REGISTRY
            .get_or_init(|| InterceptionRegistry::new(ClientConfig::shared()))
            .clone()
    }

    /// Append `spec`, installing the hook if it is not installed.
    ///
    /// Returns the spec back as the token for [`unregister`](Self::unregister).
    pub fn register(&self, spec: MockSpec) -> MockSpec {
        let mut state = self.inner.state.write();
        state.mocks.push(spec.clone());

        if !state.installed {
            let hook = MockHook::new(Arc::downgrade(&self.inner));
            self.inner.config.install(Arc::new(hook));
            state.installed = true;
            info!(hook = HOOK_NAME, "Interception enabled");
        }

        debug!(mock = %spec.label(), active = state.mocks.len(), "Mock registered");
        spec
    }

    /// Remove `spec` if present. The hook stays installed.
    pub fn unregister(&self, spec: &MockSpec) -> bool {
        self.unregister_id(spec.id())
    }

    pub fn unregister_id(&self, id: MockId) -> bool {
        let mut state = self.inner.state.write();
        match state.mocks.iter().position(|m| m.id() == id) {
            Some(index) => {
                let removed = state.mocks.remove(index);
                debug!(mock = %removed.label(), active = state.mocks.len(), "Mock unregistered");
                true
            }
            None => false,
        }
    }

    /// First registered mock accepting `request`.
    pub fn resolve(&self, request: &Request) -> Option<MockSpec> {
        self.inner.resolve(request)
    }

    /// Drop every mock and uninstall the hook. Idempotent.
    pub fn reset(&self) {
        let mut state = self.inner.state.write();
        state.mocks.clear();
        if state.installed {
            self.inner.config.uninstall(HOOK_NAME);
            state.installed = false;
            info!(hook = HOOK_NAME, "Interception disabled");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().mocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_installed(&self) -> bool {
        self.inner.state.read().installed
    }

    /// Snapshot of the active mocks in match order.
    pub fn mocks(&self) -> Vec<MockSpec> {
        self.inner.state.read().mocks.clone()
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.inner.config
    }

    pub fn stats(&self) -> InterceptStats {
        InterceptStats {
            requests_total: self.inner.requests_total.load(Ordering::Relaxed),
            requests_matched: self.inner.requests_matched.load(Ordering::Relaxed),
            requests_unmatched: self.inner.requests_unmatched.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for InterceptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("InterceptionRegistry")
            .field("mocks", &state.mocks)
            .field("installed", &state.installed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Mock;
    use http::Method;

    fn registry() -> InterceptionRegistry {
        InterceptionRegistry::new(Arc::new(ClientConfig::new()))
    }

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[test]
    fn test_first_register_installs_hook() {
        let registry = registry();
        assert!(!registry.is_installed());
        assert!(!registry.config().is_installed(HOOK_NAME));

        registry.register(Mock::request(Method::GET, "http://localhost/a").build());
        registry.register(Mock::request(Method::GET, "http://localhost/b").build());

        assert!(registry.is_installed());
        assert_eq!(registry.config().hooks().len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_in_registration_order() {
        let registry = registry();
        let first = registry.register(Mock::when(|_| true).named("first").build());
        registry.register(Mock::request(Method::GET, "http://localhost/a").named("second").build());

        assert_eq!(registry.resolve(&get("http://localhost/a")), Some(first));
    }

    #[test]
    fn test_unregister_removes_exactly_one() {
        let registry = registry();
        let spec = Mock::request(Method::GET, "http://localhost/a").build();
        registry.register(spec.clone());
        registry.register(spec.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(&spec));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(&spec));
        assert!(!registry.unregister(&spec));

        assert!(registry.resolve(&get("http://localhost/a")).is_none());
        // Hook is only removed by reset
        assert!(registry.is_installed());
        assert!(registry.config().is_installed(HOOK_NAME));
    }

    #[test]
    fn test_unregister_keeps_other_mocks() {
        let registry = registry();
        let a = registry.register(Mock::request(Method::GET, "http://localhost/a").build());
        let b = registry.register(Mock::request(Method::GET, "http://localhost/b").build());

        registry.unregister(&a);
        assert_eq!(registry.mocks(), vec![b]);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let registry = registry();
        registry.register(Mock::when(|_| true).build());

        registry.reset();
        assert!(registry.is_empty());
        assert!(!registry.is_installed());
        assert!(!registry.config().is_installed(HOOK_NAME));

        registry.reset();
        assert!(registry.is_empty());
        assert!(!registry.is_installed());
        assert!(registry.config().hooks().is_empty());

        registry.register(Mock::when(|_| true).build());
        assert!(registry.config().is_installed(HOOK_NAME));
    }

    #[test]
    fn test_predicate_may_modify_registry() {
        let registry = registry();
        let victim = Mock::request(Method::GET, "http://localhost/b").build();
        let handle = registry.clone();
        let target = victim.clone();
        registry.register(
            Mock::when(move |_| {
                handle.unregister(&target);
                false
            })
            .build(),
        );
        registry.register(victim);

        assert!(registry.resolve(&get("http://localhost/a")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_hook_declines_after_registry_dropped() {
        let config = Arc::new(ClientConfig::new());
        let registry = InterceptionRegistry::new(Arc::clone(&config));
        registry.register(Mock::when(|_| true).build());

        let hook = config.hooks().remove(0);
        assert!(hook.can_handle(&get("http://localhost/")));

        drop(registry);
        assert!(!hook.can_handle(&get("http://localhost/")));
    }
}
