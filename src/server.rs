//! HTTP server and graceful drain.
//!
//! The server does not watch OS signals itself. It stops when the
//! [`CancellationToken`] it was given is cancelled, which the supervisor in
//! `main` does once the shutdown channel fires. Then it:
//! 1. Stops `listener.accept()`, so no new connections are made.
//! 2. Asks every open connection to finish its in-flight requests and close.
//! 3. Returns from [`Server::serve`] once all connections are gone.
//!
//! The supervisor bounds step 3 with its own shutdown timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Anything the server can route requests into.
///
/// Implemented by [`App`](crate::App) for the public API and by
/// [`DebugMux`](crate::debug::DebugMux) for the operational endpoints.
pub trait Mux: Send + Sync + 'static {
    fn dispatch(&self, req: Request) -> BoxFuture<Response>;
}

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    name: &'static str,
    request_timeout: Option<Duration>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr, name: "http", request_timeout: None }
    }

    /// Names the server in its log lines (`"api"`, `"debug"`).
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Gives every request a deadline of `timeout` after it arrives.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Binds and serves `mux` until `shutdown` is cancelled and every
    /// connection has drained.
    pub async fn serve<M: Mux>(self, mux: M, shutdown: CancellationToken) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, mux, shutdown).await
    }

    /// Like [`serve`](Server::serve) on a listener that is already bound.
    pub async fn serve_listener<M: Mux>(
        self,
        listener: TcpListener,
        mux: M,
        shutdown: CancellationToken,
    ) -> Result<(), Error> {
        let name = self.name;
        let request_timeout = self.request_timeout;
        let mux = Arc::new(mux);

        info!(server = name, addr = %listener.local_addr()?, "listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during the drain.
        let mut tasks = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                // Check shutdown first so cancellation stops accepting even
                // while connections are queued.
                biased;

                () = shutdown.cancelled() => {
                    info!(server = name, in_flight = tasks.len(), "draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(server = name, "accept error: {e}");
                            continue;
                        }
                    };

                    let mux = Arc::clone(&mux);
                    let shutdown = shutdown.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let mux = Arc::clone(&mux);
                            async move { dispatch(mux, req, remote_addr, request_timeout).await }
                        });

                        // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever
                        // the client speaks.
                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let mut draining = false;
                        loop {
                            tokio::select! {
                                res = conn.as_mut() => {
                                    if let Err(e) = res {
                                        debug!(server = name, peer = %remote_addr, "connection error: {e}");
                                    }
                                    break;
                                }
                                () = shutdown.cancelled(), if !draining => {
                                    draining = true;
                                    conn.as_mut().graceful_shutdown();
                                }
                            }
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!(server = name, "stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers the body, builds the [`Request`], and routes it.
///
/// The error type is [`Infallible`](std::convert::Infallible): every failure
/// becomes a response, so hyper never sees an error.
async fn dispatch<M: Mux>(
    mux: Arc<M>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    request_timeout: Option<Duration>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "reading request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    // hyper drops this future when the client goes away; the guard then
    // cancels the token the handlers are watching.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let mut req = Request::from(http::Request::from_parts(parts, body))
        .with_remote_addr(remote_addr)
        .with_cancellation(cancel);
    if let Some(timeout) = request_timeout {
        req = req.with_deadline(Instant::now() + timeout);
    }

    Ok(mux.dispatch(req).await.into_inner())
}
