//! Middleware layer.
//!
//! Middleware is a [`Handler`] → [`Handler`] transformation. It is the
//! place for cross-cutting concerns (request logging, failure logging,
//! metrics, panic recovery) so feature handlers never have to know about
//! them.
//!
//! # Ordering
//!
//! [`compose`] wraps from the back of the list to the front, so the first
//! middleware in the list is the outermost: it sees the request first and
//! the outcome last.
//!
//! ```text
//! compose([a, b], h)  ==  a(b(h))
//!
//! a.pre → b.pre → h → b.post → a.post
//! ```
//!
//! # Contract
//!
//! The handler a middleware returns must either call the handler it wraps
//! or short-circuit with its own [`Failure`](crate::Failure). It must never
//! finish without an outcome, and it must re-surface failures it observes
//! unless converting them is its whole purpose (as [`Panics`] does).

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

mod errors;
mod logger;
mod metrics;
mod panics;

pub use errors::errors;
pub use logger::Logger;
pub use metrics::{Metrics, MetricsSnapshot, metrics};
pub use panics::Panics;

/// A transformation from one handler to another.
///
/// Implemented for any `Fn(BoxedHandler) -> BoxedHandler` closure, and by
/// hand for middleware that carries configuration.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self)(next)
    }
}

/// A type-erased middleware, shareable across every route it applies to.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Erases a middleware.
pub fn boxed(mw: impl Middleware) -> BoxedMiddleware {
    Arc::new(mw)
}

/// Wraps `inner` in every middleware of `mw`, first one outermost.
pub fn compose(mw: &[BoxedMiddleware], inner: BoxedHandler) -> BoxedHandler {
    mw.iter().rev().fold(inner, |next, m| m.wrap(next))
}

/// Wraps a bare handler value and composes it.
pub(crate) fn compose_handler(mw: &[BoxedMiddleware], inner: impl Handler) -> BoxedHandler {
    compose(mw, Arc::new(inner))
}
