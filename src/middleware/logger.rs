//! Request logging.

use std::sync::Arc;

use http::StatusCode;
use tokio::time::Instant;
use tracing::{Instrument, Span, info, info_span};

use super::Middleware;
use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Opens a span per request (trace id, method, path) under the configured
/// logger span and logs when the request starts and completes.
///
/// The completed line reports the status that will reach the client: the
/// written status, or the status the failure translates to.
pub struct Logger {
    log: Span,
}

impl Logger {
    pub fn new(log: Span) -> Self {
        Self { log }
    }
}

impl Middleware for Logger {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Logged { next, log: self.log.clone() })
    }
}

struct Logged {
    next: BoxedHandler,
    log: Span,
}

impl Handler for Logged {
    fn call(&self, ctx: Context, w: ResponseWriter, req: Request) -> BoxFuture<Outcome> {
        let span = info_span!(
            parent: &self.log,
            "request",
            trace_id = %ctx.trace_id(),
            method = %req.method(),
            path = %req.path(),
        );
        let remote_addr = req.remote_addr();
        let next = Arc::clone(&self.next);
        let guard_span = span.clone();

        Box::pin(
            async move {
                info!(?remote_addr, "request started");
                let mut unfinished = Unfinished { span: guard_span, started: ctx.started(), armed: true };

                let outcome = next.call(ctx.clone(), w.clone(), req).await;
                unfinished.armed = false;

                let status = w
                    .status()
                    .or_else(|| outcome.as_ref().err().map(|f| f.status()))
                    .unwrap_or(StatusCode::OK);
                info!(
                    status = status.as_u16(),
                    elapsed_ms = elapsed_ms(ctx.started()),
                    "request completed"
                );
                outcome
            }
            .instrument(span),
        )
    }
}

/// Logs the completion of a request whose future was dropped before the
/// chain returned, which is what happens when the client goes away.
struct Unfinished {
    span: Span,
    started: Instant,
    armed: bool,
}

impl Drop for Unfinished {
    fn drop(&mut self) {
        if self.armed {
            let _entered = self.span.enter();
            info!(cancelled = true, elapsed_ms = elapsed_ms(self.started), "request completed");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
