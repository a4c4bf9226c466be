//! # Invoker
//!
//! The caller-facing handle for one genericable. An invoker carries the
//! call options (pinned route, communication mode, timeout, attributes)
//! and produces a `CallHandle` per call.
//!
//! ## Modes
//!
//! - **Sync**: the call runs on the task awaiting the handle. The call
//!   timeout is enforced there; on expiry the outbound future is dropped,
//!   which abandons the pending request.
//! - **Async**: the call is spawned onto the runtime at `invoke` time and
//!   proceeds whether or not anyone awaits it. `cancel` aborts the task
//!   without waiting for it.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::ready;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::broker::Broker;
use crate::context::CallContext;
use crate::context::Route;
use crate::error::Error;
use crate::error::Result;
use crate::identity::ServiceId;
use fitrpc::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommunicationMode {
    #[default]
    Sync,
    Async,
}

#[derive(Clone)]
pub struct Invoker {
    broker: Arc<Broker>,
    service: ServiceId,
    route: Option<Route>,
    mode: CommunicationMode,
    timeout: Duration,
    attributes: BTreeMap<String, String>,
}

impl Invoker {
    pub(crate) fn new(broker: Arc<Broker>, service: ServiceId) -> Self {
        let timeout = broker.config().call_timeout();
        Self {
            broker,
            service,
            route: None,
            mode: CommunicationMode::default(),
            timeout,
            attributes: BTreeMap::new(),
        }
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Pins every call to the fitable `impl_id`. The version may be left
    /// out when only one version of that fitable exists.
    pub fn route(mut self, impl_id: impl Into<String>, version: Option<&str>) -> Self {
        self.route = Some(Route::new(impl_id, version.map(str::to_string)));
        self
    }

    pub fn mode(mut self, mode: CommunicationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn context(&self) -> CallContext {
        let ctx = CallContext::new().with_attributes(self.attributes.clone());
        match &self.route {
            Some(route) => ctx.with_route(route.clone()),
            None => ctx,
        }
    }

    pub fn invoke(&self, args: Vec<Value>) -> CallHandle {
        let broker = Arc::clone(&self.broker);
        let service = self.service.clone();
        let ctx = self.context();
        let timeout = self.timeout;

        let call = run(broker, service, ctx, timeout, args).boxed();

        match self.mode {
            CommunicationMode::Sync => CallHandle {
                state: State::Inline(Some(call)),
            },
            CommunicationMode::Async => CallHandle {
                state: State::Spawned(tokio::spawn(call)),
            },
        }
    }

    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.invoke(args).await
    }
}

async fn run(
    broker: Arc<Broker>,
    service: ServiceId,
    ctx: CallContext,
    timeout: Duration,
    args: Vec<Value>,
) -> Result<Value> {
    // One repository snapshot serves the whole call.
    let genericable = broker.repository().get(&service)?;
    match tokio::time::timeout(timeout, genericable.execute(&broker, &ctx, args)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(service = %service, ?timeout, "call timed out");
            Err(Error::timeout(&service))
        }
    }
}

enum State {
    /// `None` once completed or cancelled.
    Inline(Option<BoxFuture<'static, Result<Value>>>),
    Spawned(JoinHandle<Result<Value>>),
}

/// An outstanding call. Await it for the outcome.
pub struct CallHandle {
    state: State,
}

impl CallHandle {
    /// Best-effort, non-blocking cancellation. A cancelled handle resolves
    /// to `Error::Cancelled`.
    pub fn cancel(&mut self) {
        match &mut self.state {
            State::Inline(call) => {
                call.take();
            }
            State::Spawned(task) => task.abort(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Inline(call) => call.is_none(),
            State::Spawned(task) => task.is_finished(),
        }
    }
}

impl Future for CallHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            State::Inline(slot) => {
                let Some(call) = slot.as_mut() else {
                    return Poll::Ready(Err(Error::Cancelled));
                };
                let outcome = ready!(call.as_mut().poll(cx));
                *slot = None;
                Poll::Ready(outcome)
            }
            State::Spawned(task) => match ready!(Pin::new(task).poll(cx)) {
                Ok(outcome) => Poll::Ready(outcome),
                Err(e) if e.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
                Err(e) => Poll::Ready(Err(Error::Internal(format!("call task failed: {}", e)))),
            },
        }
    }
}
