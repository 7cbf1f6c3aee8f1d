//! Response delivery.
//!
//! Each claimed request gets an [`InterceptionContext`]. The
//! [`ResponseDispatcher`] computes the mock's outcome up front, waits out the
//! mock's delay on a worker, then emits the signal sequence for that outcome
//! through the context exactly once:
//!
//! - content: metadata, body, finished
//! - empty: metadata, finished
//! - failure: failed

use crate::client::{InFlight, ResponseSink};
use crate::error::DeliveryError;
use crate::mock::MockSpec;
use crate::request::Request;
use crate::response::{Body, CachePolicy, ResponseOutcome};
use http::Method;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};
use url::Url;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of one interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Scheduled,
    Delivering,
    Completed,
    Failed,
    Cancelled,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Completed | DeliveryState::Failed | DeliveryState::Cancelled
        )
    }
}

/// State for one in-flight interception.
pub struct InterceptionContext {
    id: u64,
    method: Method,
    url: Url,
    sink: Arc<dyn ResponseSink>,
    state: Mutex<DeliveryState>,
    timer: Mutex<Option<tokio::task::AbortHandle>>,
    /// Deliveries refused because the context was already past delivery.
    rejected: AtomicU64,
}

impl InterceptionContext {
    pub fn new(request: &Request, sink: Arc<dyn ResponseSink>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            method: request.method.clone(),
            url: request.url.clone(),
            sink,
            state: Mutex::new(DeliveryState::Pending),
            timer: Mutex::new(None),
            rejected: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> DeliveryState {
        *self.state.lock()
    }

    pub fn rejected_deliveries(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn schedule(&self) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        match *state {
            DeliveryState::Pending => {
                *state = DeliveryState::Scheduled;
                Ok(())
            }
            DeliveryState::Cancelled => Err(DeliveryError::Cancelled),
            other => Err(self.reject(other)),
        }
    }

    fn reject(&self, state: DeliveryState) -> DeliveryError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        DeliveryError::AlreadyDelivered(state)
    }

    /// Keep `handle` only while delivery is still pending.
    fn set_timer(&self, handle: tokio::task::AbortHandle) {
        let state = self.state.lock();
        match *state {
            DeliveryState::Scheduled => *self.timer.lock() = Some(handle),
            DeliveryState::Cancelled => handle.abort(),
            _ => {}
        }
    }

    /// Emit the signal sequence for `outcome`.
    ///
    /// Liveness is checked right before the first signal; a cancelled or
    /// already delivered context emits nothing.
    pub fn deliver(&self, outcome: ResponseOutcome) -> Result<(), DeliveryError> {
        {
            let mut state = self.state.lock();
            match *state {
                DeliveryState::Pending | DeliveryState::Scheduled => {
                    *state = DeliveryState::Delivering;
                }
                DeliveryState::Cancelled => return Err(DeliveryError::Cancelled),
                other => return Err(self.reject(other)),
            }
        }

        let terminal = match outcome {
            ResponseOutcome::Success(metadata, body) => {
                trace!(context = self.id, status = %metadata.status, "Delivering response");
                self.sink
                    .did_receive_response(metadata, CachePolicy::NotAllowed);
                if let Body::Content(bytes) = body {
                    self.sink.did_load(bytes);
                }
                self.sink.did_finish();
                DeliveryState::Completed
            }
            ResponseOutcome::Failure(err) => {
                trace!(context = self.id, error = %err, "Delivering failure");
                self.sink.did_fail(err);
                DeliveryState::Failed
            }
        };

        self.timer.lock().take();
        *self.state.lock() = terminal;
        Ok(())
    }

    /// Suppress any pending delivery. Idempotent; has no effect once
    /// delivery has started.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(*state, DeliveryState::Pending | DeliveryState::Scheduled) {
            *state = DeliveryState::Cancelled;
            drop(state);
            if let Some(timer) = self.timer.lock().take() {
                timer.abort();
            }
            debug!(
                context = self.id,
                method = %self.method,
                url = %self.url,
                "Interception cancelled"
            );
        }
    }

    fn complete(&self, outcome: ResponseOutcome) {
        match self.deliver(outcome) {
            Ok(()) => {}
            Err(DeliveryError::Cancelled) => {
                debug!(context = self.id, url = %self.url, "Delivery suppressed after cancel");
            }
            Err(err) => {
                error!(context = self.id, url = %self.url, error = %err, "Invalid delivery");
            }
        }
    }
}

impl InFlight for InterceptionContext {
    fn cancel(&self) {
        InterceptionContext::cancel(self);
    }
}

impl std::fmt::Debug for InterceptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Schedules delayed delivery of mock outcomes.
///
/// Uses the ambient tokio runtime when there is one and a short-lived
/// thread otherwise, so the caller of [`dispatch`](Self::dispatch) never
/// waits on the delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDispatcher;

impl ResponseDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch(
        &self,
        spec: &MockSpec,
        request: &Request,
        context: &Arc<InterceptionContext>,
    ) -> Result<(), DeliveryError> {
        // The delay models latency, not the cost of building the response
        let outcome = spec.respond(request);
        context.schedule()?;

        let delay = spec.delay();
        debug!(
            context = context.id,
            mock = %spec.label(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling mock response"
        );

        let ctx = Arc::clone(context);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    ctx.complete(outcome);
                });
                context.set_timer(task.abort_handle());
            }
            Err(_) => spawn_thread(ctx, outcome, delay),
        }
        Ok(())
    }
}

fn spawn_thread(ctx: Arc<InterceptionContext>, outcome: ResponseOutcome, delay: Duration) {
    let fallback = Arc::clone(&ctx);
    let spawned = std::thread::Builder::new()
        .name(format!("mock-intercept-{}", ctx.id))
        .spawn(move || {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            ctx.complete(outcome);
        });

    if let Err(err) = spawned {
        error!(context = fallback.id, error = %err, "Failed to spawn delivery thread");
        fallback.complete(ResponseOutcome::Failure(
            crate::error::InterceptError::simulated(
                crate::error::FailureKind::Other,
                format!("delivery worker unavailable: {err}"),
            ),
        ));
    }
}
