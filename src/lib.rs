//! # corbel
//!
//! Route registration, middleware composition and shutdown signaling in
//! front of a radix-tree path matcher, plus a separate debug surface for
//! operational endpoints.
//!
//! ## The contract
//!
//! - A [`Handler`] gets a [`Context`], a write-once [`ResponseWriter`] and
//!   the [`Request`]. It writes a response and returns `Ok(())`, or it
//!   writes nothing and returns a [`Failure`].
//! - [`Middleware`](middleware::Middleware) turns a handler into another
//!   handler. The [`App`] wraps every route in the same process-wide
//!   middleware, in the same order.
//! - Failures become HTTP responses in exactly one place, after the whole
//!   chain has run. An integrity failure ([`Failure::Shutdown`]) also asks
//!   the supervisor to stop the process through the shutdown channel.
//! - Profiling, exported variables and health checks live on a
//!   [`DebugMux`](debug::DebugMux), never on the `App`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use corbel::{App, Context, Failure, Request, ResponseWriter, Server, middleware, shutdown};
//! use http::Method;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), corbel::Error> {
//!     let (signal, listener) = shutdown::channel();
//!     let mut app = App::new(signal, vec![middleware::errors()]);
//!     app.handle(Method::GET, "v1", "/users/{id}", get_user, &[])?;
//!
//!     let token = CancellationToken::new();
//!     let server = tokio::spawn(
//!         Server::bind("0.0.0.0:3000".parse().unwrap()).serve(app, token.clone()),
//!     );
//!     listener.recv().await;
//!     token.cancel();
//!     server.await.unwrap()
//! }
//!
//! async fn get_user(ctx: Context, w: ResponseWriter, _req: Request) -> Result<(), Failure> {
//!     match ctx.param("id") {
//!         Some("42") => w.respond(corbel::Response::json(r#"{"id":"42"}"#)),
//!         Some(id) => Err(Failure::not_found(format!("user {id} not found"))),
//!         None => Err(Failure::bad_request("missing id")),
//!     }
//! }
//! ```

mod app;
mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod debug;
pub mod handlers;
pub mod middleware;
pub mod shutdown;

pub use app::App;
pub use context::{Context, REQUEST_ID_HEADER};
pub use error::{Error, FieldError, Failure};
pub use handler::{BoxFuture, BoxedHandler, Handler, Outcome};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder, ResponseWriter};
pub use server::{Mux, Server};
