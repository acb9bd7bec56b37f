//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Every route ends in a value of a different concrete type: an `async`
//! closure here, a struct with injected collaborators there, a middleware
//! wrapper around either. The matcher can only hold one type, so each
//! handler is erased to a [`BoxedHandler`] (`Arc<dyn Handler>`) at
//! registration.
//!
//! ```text
//! |ctx, w, req| async move { … }         ← feature code writes this
//!        ↓ app.handle(GET, "v1", "/test", h, &[])
//! Arc::new(h)                            ← BoxedHandler
//!        ↓ middleware::compose(mw, h)
//! Arc<Logger<Panics<…>>>                 ← still one BoxedHandler
//!        ↓ at request time
//! handler.call(ctx, w, req)              ← one vtable dispatch per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Failure;
use crate::request::Request;
use crate::response::ResponseWriter;

/// What a handler produces: `Ok(())` once it has written its response to
/// the [`ResponseWriter`], or a [`Failure`] for the transport to translate.
pub type Outcome = Result<(), Failure>;

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move the future across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A heap-allocated, type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// A unit of request-handling logic.
///
/// Implemented automatically for any closure or function with the shape
///
/// ```text
/// Fn(Context, ResponseWriter, Request) -> impl Future<Output = Outcome>
/// ```
///
/// Implement it by hand when the handler owns state:
///
/// ```rust
/// use corbel::{BoxFuture, Context, Handler, Outcome, Request, ResponseWriter};
///
/// struct Greeter { greeting: String }
///
/// impl Handler for Greeter {
///     fn call(&self, _ctx: Context, w: ResponseWriter, _req: Request) -> BoxFuture<Outcome> {
///         let body = self.greeting.clone();
///         Box::pin(async move { w.respond(body) })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context, w: ResponseWriter, req: Request) -> BoxFuture<Outcome>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context, ResponseWriter, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, ctx: Context, w: ResponseWriter, req: Request) -> BoxFuture<Outcome> {
        Box::pin((self)(ctx, w, req))
    }
}

/// Erases a handler so it can be stored next to handlers of other types.
pub fn boxed(handler: impl Handler) -> BoxedHandler {
    Arc::new(handler)
}
