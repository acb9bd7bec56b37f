//! The application: route registration and middleware composition.
//!
//! [`App`] owns the path matcher, the process-wide middleware, and the send
//! side of the shutdown channel. Feature code only ever talks to it through
//! [`App::handle`]; the matcher itself is not reachable from outside, so the
//! only way onto the public route table is through the middleware stack.

use std::sync::Arc;

use http::{HeaderValue, Method, StatusCode};
use tracing::error;

use crate::context::{Context, REQUEST_ID_HEADER};
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{self, BoxedMiddleware};
use crate::request::Request;
use crate::response::{IntoResponse, Response, ResponseWriter};
use crate::router::{Endpoint, Router};
use crate::server::Mux;
use crate::shutdown::{ShutdownReason, ShutdownSignal};

/// The entry point of the public API: every route of the service is
/// registered here and served from here.
pub struct App {
    router: Router,
    mw: Vec<BoxedMiddleware>,
    shutdown: ShutdownSignal,
}

impl App {
    /// Creates an application whose routes all run through `mw`, first
    /// element outermost.
    pub fn new(shutdown: ShutdownSignal, mw: Vec<BoxedMiddleware>) -> Self {
        Self { router: Router::new(), mw, shutdown }
    }

    /// Asks the supervisor to shut the process down gracefully.
    ///
    /// Never blocks. Safe to call any number of times from any task.
    pub fn signal_shutdown(&self) {
        self.shutdown.signal(ShutdownReason::Terminate);
    }

    /// Registers `handler` for `method` at `path`, under `group` when it is
    /// not empty (`"v1"` + `"/test"` → `"/v1/test"`).
    ///
    /// `mw` wraps the handler first, then the application's own middleware
    /// wraps the result, so every route sees the application middleware in
    /// the same order and outermost.
    ///
    /// # Errors
    ///
    /// [`Error::RouteConflict`] if the final `(method, path)` is already
    /// registered (the existing handler stays bound), or
    /// [`Error::InvalidRoute`] if the path is not a valid pattern.
    pub fn handle(
        &mut self,
        method: Method,
        group: &str,
        path: &str,
        handler: impl Handler,
        mw: &[BoxedMiddleware],
    ) -> Result<(), Error> {
        let handler = middleware::compose_handler(mw, handler);
        let handler = middleware::compose(&self.mw, handler);

        let final_path = if group.is_empty() {
            path.to_owned()
        } else {
            format!("/{group}{path}")
        };
        self.router
            .insert(method, &final_path, endpoint(handler, Some(self.shutdown.clone())))
    }

    /// Routes one request through the matcher and its handler chain.
    pub fn dispatch(&self, req: Request) -> BoxFuture<Response> {
        self.router.dispatch(req)
    }
}

impl Mux for App {
    fn dispatch(&self, req: Request) -> BoxFuture<Response> {
        App::dispatch(self, req)
    }
}

/// Builds the transport-facing function for a fully composed handler.
///
/// This is the only place a [`Failure`](crate::Failure) becomes an HTTP
/// response, and it writes exactly one: the handler's own response on
/// success, or the translated failure otherwise.
pub(crate) fn endpoint(handler: BoxedHandler, shutdown: Option<ShutdownSignal>) -> Endpoint {
    Arc::new(move |mut req: Request| -> BoxFuture<Response> {
        let handler = Arc::clone(&handler);
        let shutdown = shutdown.clone();

        Box::pin(async move {
            let ctx = Context::from_request(&mut req);
            let w = ResponseWriter::new();

            let outcome = handler.call(ctx.clone(), w.clone(), req).await;

            let mut response = match outcome {
                Ok(()) => w.take().unwrap_or_else(|| Response::status(StatusCode::OK)),
                Err(failure) => {
                    if failure.is_shutdown() {
                        if let Some(shutdown) = &shutdown {
                            shutdown.signal(ShutdownReason::Integrity(failure.to_string()));
                        }
                    }
                    match w.take() {
                        Some(written) => {
                            error!(
                                trace_id = %ctx.trace_id(),
                                %failure,
                                "handler wrote a response and also failed; keeping the written response"
                            );
                            written
                        }
                        None => failure.into_response(),
                    }
                }
            };

            if let Ok(value) = HeaderValue::try_from(ctx.trace_id().to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::Failure;
    use crate::middleware::Logger;
    use crate::middleware::testing::{Journal, recording};
    use crate::shutdown;

    fn get(path: &str) -> Request {
        http::Request::get(path).body(Bytes::new()).unwrap().into()
    }

    async fn ok(_ctx: Context, w: ResponseWriter, _req: Request) -> Result<(), Failure> {
        w.respond("ok")
    }

    #[tokio::test]
    async fn group_prefixes_the_path() {
        let (signal, _listener) = shutdown::channel();
        let mut app = App::new(signal, Vec::new());
        app.handle(Method::GET, "v1", "/test", ok, &[]).unwrap();
        app.handle(Method::GET, "", "/plain", ok, &[]).unwrap();

        assert_eq!(app.dispatch(get("/v1/test")).await.status_code(), StatusCode::OK);
        assert_eq!(app.dispatch(get("/plain")).await.status_code(), StatusCode::OK);
        assert_eq!(app.dispatch(get("/test")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn app_middleware_wraps_route_middleware() {
        let journal = Journal::default();
        let (signal, _listener) = shutdown::channel();
        let mut app = App::new(
            signal,
            vec![recording("app1", &journal), recording("app2", &journal)],
        );
        let route_mw = [recording("route", &journal)];
        app.handle(Method::GET, "v1", "/a", ok, &route_mw).unwrap();
        app.handle(Method::GET, "v1", "/b", ok, &[]).unwrap();

        app.dispatch(get("/v1/a")).await;
        assert_eq!(
            *journal.lock(),
            ["app1:pre", "app2:pre", "route:pre", "route:post", "app2:post", "app1:post"]
        );

        journal.lock().clear();
        app.dispatch(get("/v1/b")).await;
        assert_eq!(*journal.lock(), ["app1:pre", "app2:pre", "app2:post", "app1:post"]);
    }

    #[tokio::test]
    async fn unwritten_success_is_empty_ok() {
        let (signal, _listener) = shutdown::channel();
        let mut app = App::new(signal, Vec::new());
        app.handle(
            Method::POST,
            "",
            "/noop",
            |_ctx: Context, _w: ResponseWriter, _req: Request| async { Ok::<(), Failure>(()) },
            &[],
        )
        .unwrap();

        let resp = app.dispatch(http::Request::post("/noop").body(Bytes::new()).unwrap().into()).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn write_then_fail_keeps_the_written_response() {
        let (signal, _listener) = shutdown::channel();
        let mut app = App::new(signal, Vec::new());
        app.handle(
            Method::GET,
            "",
            "/sloppy",
            |_ctx: Context, w: ResponseWriter, _req: Request| async move {
                w.respond("partial")?;
                Err::<(), _>(Failure::internal("late failure"))
            },
            &[],
        )
        .unwrap();

        let resp = app.dispatch(get("/sloppy")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"partial");
    }

    #[tokio::test]
    async fn integrity_failure_signals_shutdown() {
        let (signal, listener) = shutdown::channel();
        let mut app = App::new(signal, Vec::new());
        app.handle(
            Method::GET,
            "",
            "/corrupt",
            |_ctx: Context, _w: ResponseWriter, _req: Request| async {
                Err::<(), _>(Failure::shutdown("ledger checksum mismatch"))
            },
            &[],
        )
        .unwrap();

        let resp = app.dispatch(get("/corrupt")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(listener.is_requested());
        assert!(matches!(
            listener.recv().await,
            ShutdownReason::Integrity(ref d) if d.contains("ledger checksum mismatch")
        ));
    }

    #[tokio::test]
    async fn signal_shutdown_is_idempotent() {
        let (signal, listener) = shutdown::channel();
        let app = Arc::new(App::new(signal, Vec::new()));
        app.signal_shutdown();
        app.signal_shutdown();
        assert_eq!(listener.recv().await, ShutdownReason::Terminate);
    }

    #[tokio::test]
    async fn response_carries_the_trace_id() {
        let (signal, _listener) = shutdown::channel();
        let mut app = App::new(signal, Vec::new());
        app.handle(Method::GET, "", "/", ok, &[]).unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let req: Request = http::Request::get("/")
            .header(REQUEST_ID_HEADER, &id)
            .body(Bytes::new())
            .unwrap()
            .into();
        let resp = app.dispatch(req).await;
        assert_eq!(resp.headers()[REQUEST_ID_HEADER], id.as_str());
    }

    #[tokio::test]
    async fn request_logger_brackets_the_handler_once() {
        let capture = crate::middleware::testing::Capture::default();
        let _guard = capture.install();

        let (signal, _listener) = shutdown::channel();
        let mut app = App::new(signal, vec![middleware::boxed(Logger::new(tracing::Span::none()))]);
        app.handle(Method::GET, "v1", "/test", ok, &[]).unwrap();

        let resp = app.dispatch(get("/v1/test")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"ok");

        assert_eq!(capture.named("request started").len(), 1);
        let completed = capture.named("request completed");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].field("status"), Some("200"));
    }
}
