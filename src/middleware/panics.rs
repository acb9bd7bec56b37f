//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use super::Middleware;
use super::metrics::Metrics;
use crate::context::Context;
use crate::error::Failure;
use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Turns a panic anywhere in the inner chain into a structured failure.
///
/// Every caught panic is counted in [`Metrics`]. Below the shutdown limit
/// the failure is [`Failure::Internal`]; from the limit on it is
/// [`Failure::Shutdown`], which asks the supervisor to stop the process.
/// Without a limit, panics never escalate.
pub struct Panics {
    metrics: Arc<Metrics>,
    shutdown_after: Option<u64>,
}

impl Panics {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics, shutdown_after: None }
    }

    /// Escalates the `limit`-th and every later panic to an integrity
    /// failure. A limit of zero is treated as one.
    pub fn shutdown_after(mut self, limit: u64) -> Self {
        self.shutdown_after = Some(limit.max(1));
        self
    }
}

impl Middleware for Panics {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Recover {
            next,
            metrics: Arc::clone(&self.metrics),
            shutdown_after: self.shutdown_after,
        })
    }
}

struct Recover {
    next: BoxedHandler,
    metrics: Arc<Metrics>,
    shutdown_after: Option<u64>,
}

impl Handler for Recover {
    fn call(&self, ctx: Context, w: ResponseWriter, req: Request) -> BoxFuture<Outcome> {
        let next = Arc::clone(&self.next);
        let metrics = Arc::clone(&self.metrics);
        let shutdown_after = self.shutdown_after;

        Box::pin(async move {
            // Calling `next` inside the guarded future also catches panics
            // raised before the handler's own future is built.
            let guarded = AssertUnwindSafe(async move { next.call(ctx, w, req).await });
            match guarded.catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    let total = metrics.add_panic();
                    match shutdown_after {
                        Some(limit) if total >= limit => Err(Failure::shutdown(format!(
                            "panic limit reached ({total}/{limit}): {message}"
                        ))),
                        _ => Err(Failure::internal(format!("panic: {message}"))),
                    }
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
