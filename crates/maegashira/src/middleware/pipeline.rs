//! User-supplied middleware registry and the pre/post pipeline runner.
//!
//! An embedding application registers named handlers once at startup; a
//! route opts in by listing keys. Handlers are plain async function values
//! over a [`MiddlewareState`]: each receives the previous handler's output
//! state and returns the next one.

use crate::models::transaction::Transaction;
use actix_web::http::header::HeaderMap;
use actix_web::web::Bytes;
use futures::future::BoxFuture;
use log::warn;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Verdict a handler returns in its output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Continue to the next handler (or to the next request phase).
    #[default]
    Next,
    /// Stop the pipeline and cancel the request.
    Cancel,
}

/// State threaded through a middleware phase.
///
/// In the pre-processing phase `headers` and `body` are the request's; in
/// the post-processing phase they are the response's. Whatever the last
/// handler returns becomes the proxy's authoritative view.
#[derive(Debug, Clone)]
pub struct MiddlewareState {
    /// Snapshot of the transaction for inspection; phase timings are
    /// stamped by the state machine, not by handlers.
    pub transaction: Transaction,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub action: Action,
    /// Overrides the default `middleware_cancelled:<key>` reason when a
    /// handler cancels.
    pub cancellation_reason: Option<String>,
}

impl MiddlewareState {
    pub fn new(transaction: Transaction, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            transaction,
            headers,
            body,
            action: Action::Next,
            cancellation_reason: None,
        }
    }
}

/// A registered handler: an async function value over the phase state.
pub type MiddlewareFn =
    Arc<dyn Fn(MiddlewareState) -> BoxFuture<'static, MiddlewareState> + Send + Sync>;

/// Named middleware handlers, built at startup and immutable afterwards.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    handlers: HashMap<String, MiddlewareFn>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `key`, replacing any previous handler with
    /// the same key.
    pub fn register<F, Fut>(&mut self, key: impl Into<String>, handler: F)
    where
        F: Fn(MiddlewareState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareState> + Send + 'static,
    {
        self.handlers.insert(
            key.into(),
            Arc::new(move |state| -> BoxFuture<'static, MiddlewareState> {
                Box::pin(handler(state))
            }),
        );
    }

    pub fn get(&self, key: &str) -> Option<&MiddlewareFn> {
        self.handlers.get(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Result of running one phase of the pipeline.
pub enum PipelineOutcome {
    /// Every handler returned `next`; carries the final state.
    Completed(MiddlewareState),
    /// A handler cancelled; carries the offending key, the effective
    /// cancellation reason and the state at that point.
    Cancelled {
        key: String,
        reason: String,
        state: MiddlewareState,
    },
}

/// Runs the handlers named by `keys` in order, feeding each handler the
/// previous one's output state.
///
/// Keys with no registered handler are logged and skipped.
pub async fn run_pipeline(
    registry: &MiddlewareRegistry,
    keys: &[String],
    mut state: MiddlewareState,
) -> PipelineOutcome {
    for key in keys {
        let handler = match registry.get(key) {
            Some(handler) => Arc::clone(handler),
            None => {
                warn!("middleware '{key}' is not registered, skipping");
                continue;
            }
        };

        state = handler(state).await;

        if state.action == Action::Cancel {
            let reason = state
                .cancellation_reason
                .clone()
                .unwrap_or_else(|| format!("middleware_cancelled:{key}"));
            return PipelineOutcome::Cancelled {
                key: key.clone(),
                reason,
                state,
            };
        }
    }
    PipelineOutcome::Completed(state)
}
