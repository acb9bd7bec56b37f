//! Request-scoped execution context.
//!
//! Every handler receives a [`Context`] next to the request. It carries what
//! the handler did not ask for but has to honor: the correlation id used in
//! every log line, the path parameters the matcher extracted, and the
//! cancellation signal and deadline of the transport.
//!
//! A handler that waits on anything should do so through [`Context::run`],
//! which turns a cancelled or late request into [`Failure::Cancelled`]
//! instead of leaving the task hanging.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Failure;
use crate::request::Request;

/// Header carrying the correlation id, both inbound and outbound.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Cheaply cloneable request-scoped values.
#[derive(Clone, Debug)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    trace_id: Uuid,
    started: Instant,
    params: HashMap<String, String>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Derives the context from a request, moving the path parameters out
    /// of it. An inbound `x-request-id` that parses as a UUID is reused as
    /// the trace id; otherwise a fresh one is generated.
    pub(crate) fn from_request(req: &mut Request) -> Self {
        let trace_id = req
            .header(REQUEST_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .unwrap_or_else(Uuid::new_v4);

        Self {
            inner: Arc::new(Inner {
                trace_id,
                started: Instant::now(),
                params: std::mem::take(&mut req.params),
                cancel: req.cancel.clone(),
                deadline: req.deadline,
            }),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.inner.trace_id
    }

    /// When the request entered the handler chain.
    pub fn started(&self) -> Instant {
        self.inner.started
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `ctx.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.params
    }

    /// True once the transport cancelled the request or its deadline
    /// passed.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the request is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.inner.deadline {
            Some(deadline) => tokio::select! {
                () = self.inner.cancel.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => self.inner.cancel.cancelled().await,
        }
    }

    /// Runs `fut` to completion unless the request is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Failure> {
        if self.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancelled() => Err(Failure::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn request(builder: http::request::Builder) -> Request {
        builder.body(Bytes::new()).unwrap().into()
    }

    #[test]
    fn reuses_valid_request_id() {
        let id = Uuid::new_v4();
        let mut req = request(
            http::Request::get("/").header(REQUEST_ID_HEADER, id.to_string()),
        );
        assert_eq!(Context::from_request(&mut req).trace_id(), id);
    }

    #[test]
    fn replaces_garbage_request_id() {
        let mut req = request(http::Request::get("/").header(REQUEST_ID_HEADER, "nope"));
        let ctx = Context::from_request(&mut req);
        assert_ne!(ctx.trace_id().to_string(), "nope");
    }

    #[test]
    fn params_move_into_the_context() {
        let mut req = request(http::Request::get("/users/42"));
        req.params.insert("id".to_owned(), "42".to_owned());

        let ctx = Context::from_request(&mut req);
        assert_eq!(ctx.param("id"), Some("42"));
        assert!(req.params.is_empty());
    }

    #[tokio::test]
    async fn run_completes_when_not_cancelled() {
        let mut req = request(http::Request::get("/"));
        let ctx = Context::from_request(&mut req);
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn run_aborts_on_cancellation() {
        let token = CancellationToken::new();
        let mut req = request(http::Request::get("/")).with_cancellation(token.clone());
        let ctx = Context::from_request(&mut req);

        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.run(std::future::pending::<()>()).await }
        });
        token.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(Failure::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn run_aborts_past_the_deadline() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let mut req = request(http::Request::get("/")).with_deadline(deadline);
        let ctx = Context::from_request(&mut req);

        let out = ctx.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(matches!(out, Err(Failure::Cancelled)));
    }
}
