//! Per-request scope creation and teardown.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use quill_db::RequestScope;
use std::sync::Arc;
use thiserror::Error;

/// The failure that ended a request or command, handed to teardown hooks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RequestFailure {
    message: String,
}

impl RequestFailure {
    /// A failure described by `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A function run once at the end of every request.
pub type TeardownHook = Arc<dyn Fn(&RequestScope, Option<&RequestFailure>) + Send + Sync>;

/// The registered teardown hooks, in registration order.
#[derive(Clone)]
pub struct TeardownHooks(Arc<[TeardownHook]>);

impl TeardownHooks {
    /// Wraps `hooks`, keeping their order.
    pub fn new(hooks: Vec<TeardownHook>) -> Self {
        Self(hooks.into())
    }

    /// Runs every hook against `scope` on the current thread.
    pub fn run(&self, scope: &RequestScope, failure: Option<&RequestFailure>) {
        for hook in self.0.iter() {
            hook(scope, failure);
        }
    }

    /// Runs every hook on the blocking pool and waits for them.
    ///
    /// Closing a connection can wait on a query still running on another
    /// thread, so hooks never run on an async worker.
    pub async fn run_blocking(&self, scope: RequestScope, failure: Option<RequestFailure>) {
        let hooks = self.clone();
        let id = scope.id();
        if let Err(e) =
            tokio::task::spawn_blocking(move || hooks.run(&scope, failure.as_ref())).await
        {
            tracing::error!(scope = %id, "teardown task failed: {}", e);
        }
    }
}

/// Fires teardown exactly once, even if the request future is dropped
/// before it completes.
struct TeardownGuard {
    scope: RequestScope,
    hooks: TeardownHooks,
    fired: bool,
}

impl TeardownGuard {
    /// Marks the guard fired. Returns false if it already was.
    fn disarm(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    fn fire(&mut self, failure: Option<&RequestFailure>) {
        if self.disarm() {
            self.hooks.run(&self.scope, failure);
        }
    }

    async fn fire_blocking(&mut self, failure: Option<RequestFailure>) {
        if self.disarm() {
            self.hooks.run_blocking(self.scope.clone(), failure).await;
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if self.fired {
            return;
        }
        tracing::warn!(scope = %self.scope.id(), "request aborted, running teardown");
        let failure = RequestFailure::new("request aborted before completion");

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                self.disarm();
                let scope = self.scope.clone();
                let hooks = self.hooks.clone();
                runtime.spawn_blocking(move || hooks.run(&scope, Some(&failure)));
            }
            Err(_) => self.fire(Some(&failure)),
        }
    }
}

/// Middleware giving every request its own [`RequestScope`].
///
/// The scope is available to handlers as `Extension<RequestScope>`. Once the
/// response is produced all teardown hooks run on the blocking pool with
/// the failure carried by the response, if any. The response is returned
/// only after they finish.
pub async fn request_scope(
    State(hooks): State<TeardownHooks>,
    mut req: Request,
    next: Next,
) -> Response {
    let scope = RequestScope::new();
    req.extensions_mut().insert(scope.clone());

    let mut guard = TeardownGuard {
        scope,
        hooks,
        fired: false,
    };

    let response = next.run(req).await;
    let failure = response.extensions().get::<RequestFailure>().cloned();
    guard.fire_blocking(failure).await;

    response
}
