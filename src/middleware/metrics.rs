//! Request counters.
//!
//! Plain atomics: one relaxed increment per request, read by the
//! `/debug/vars` endpoint through [`Metrics::publish`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use super::{BoxedMiddleware, boxed};
use crate::context::Context;
use crate::debug::Vars;
use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Process-wide request counters, shared by the metrics and panics
/// middleware.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    in_flight: AtomicI64,
}

/// A point-in-time copy of [`Metrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub panics: u64,
    pub in_flight: i64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    /// Exposes the counters as the `metrics` variable.
    pub fn publish(self: &Arc<Self>, vars: &Vars) {
        let metrics = Arc::clone(self);
        vars.publish("metrics", move || {
            serde_json::to_value(metrics.snapshot()).unwrap_or_default()
        });
    }

    /// Records a caught panic and returns the running total.
    pub(crate) fn add_panic(&self) -> u64 {
        self.panics.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Counts requests, failures and requests in flight.
pub fn metrics(metrics: Arc<Metrics>) -> BoxedMiddleware {
    boxed(move |next: BoxedHandler| -> BoxedHandler {
        let metrics = Arc::clone(&metrics);
        Arc::new(move |ctx: Context, w: ResponseWriter, req: Request| {
            let next = Arc::clone(&next);
            let metrics = Arc::clone(&metrics);
            async move {
                metrics.requests.fetch_add(1, Ordering::Relaxed);
                let _in_flight = InFlight::enter(&metrics);

                let outcome = next.call(ctx, w, req).await;

                if outcome.is_err() {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                }
                outcome
            }
        })
    })
}

/// Holds one unit of the in-flight gauge. Released on drop, so a request
/// future dropped mid-flight (client gone) is still accounted for.
struct InFlight<'a> {
    metrics: &'a Metrics,
}

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        Self { metrics }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::error::Failure;
    use crate::middleware::compose;

    async fn call(h: &BoxedHandler, path: &str) -> crate::handler::Outcome {
        let mut req: Request = http::Request::get(path).body(Bytes::new()).unwrap().into();
        let ctx = Context::from_request(&mut req);
        h.call(ctx, ResponseWriter::new(), req).await
    }

    fn routed() -> BoxedHandler {
        Arc::new(|_ctx: Context, w: ResponseWriter, req: Request| async move {
            match req.path() {
                "/hang" => std::future::pending().await,
                "/fail" => Err(Failure::not_found("nothing here")),
                _ => w.respond(StatusCode::NO_CONTENT),
            }
        })
    }

    #[tokio::test]
    async fn counts_requests_and_failures() {
        let m = Metrics::new();
        let h = compose(&[metrics(Arc::clone(&m))], routed());

        assert!(call(&h, "/ok").await.is_ok());
        assert!(call(&h, "/fail").await.is_err());

        assert_eq!(
            m.snapshot(),
            MetricsSnapshot { requests: 2, errors: 1, panics: 0, in_flight: 0 }
        );
    }

    #[tokio::test]
    async fn dropped_request_leaves_the_gauge() {
        let m = Metrics::new();
        let h = compose(&[metrics(Arc::clone(&m))], routed());

        let hung = tokio::time::timeout(Duration::from_millis(20), call(&h, "/hang")).await;
        assert!(hung.is_err());

        let snapshot = m.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn gauge_tracks_pending_requests() {
        let m = Metrics::new();
        let h = compose(&[metrics(Arc::clone(&m))], routed());

        let pending = tokio::spawn({
            let h = Arc::clone(&h);
            async move { call(&h, "/hang").await }
        });
        while m.snapshot().in_flight == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(m.snapshot().in_flight, 1);

        pending.abort();
        let _ = pending.await;
        assert_eq!(m.snapshot().in_flight, 0);
    }

    #[test]
    fn publishes_under_metrics() {
        let m = Metrics::new();
        let vars = Vars::new();
        m.publish(&vars);
        assert_eq!(vars.to_json()["metrics"]["requests"], 0);
    }
}
