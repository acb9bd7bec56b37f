//! The debug surface.
//!
//! Profiling, exported variables and health checks are served from a
//! [`DebugMux`]: a matcher of its own, bound to its own listener. It never
//! shares a route table with the [`App`](crate::App), so nothing registered
//! on the public API (a dependency included) can expose these endpoints,
//! and nothing registered here can leak onto the public API.
//!
//! | Path | Serves |
//! |---|---|
//! | `/debug/pprof/` | profile index |
//! | `/debug/pprof/cmdline` | process command line |
//! | `/debug/pprof/profile` | CPU profile flame graph (unix) |
//! | `/debug/pprof/runtime` | async runtime snapshot |
//! | `/debug/vars` | exported variables as JSON |

use http::{Method, StatusCode};

use crate::app::endpoint;
use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, boxed};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};
use crate::router::Router;
use crate::server::Mux;

mod pprof;
mod vars;

pub use vars::Vars;

/// A multiplexer for operational endpoints.
///
/// Handlers registered here follow the same [`Handler`] contract as the
/// public API but run without middleware.
pub struct DebugMux {
    router: Router,
}

impl DebugMux {
    /// An empty debug mux.
    pub fn new() -> Self {
        Self { router: Router::new() }
    }

    /// A debug mux with the profiling and exported-variable endpoints
    /// registered.
    pub fn standard(vars: Vars) -> Result<Self, Error> {
        let mut mux = Self::new();
        mux.handle(Method::GET, "/debug/pprof/", pprof::index)?;
        mux.handle(Method::GET, "/debug/pprof/cmdline", pprof::cmdline)?;
        #[cfg(unix)]
        mux.handle(Method::GET, "/debug/pprof/profile", pprof::profile)?;
        mux.handle(Method::GET, "/debug/pprof/runtime", pprof::runtime)?;
        mux.handle(
            Method::GET,
            "/debug/vars",
            move |_ctx: Context, w: ResponseWriter, _req: Request| {
                let vars = vars.clone();
                async move { w.json(StatusCode::OK, &vars.to_json()) }
            },
        )?;
        Ok(mux)
    }

    /// Registers a debug handler.
    ///
    /// # Errors
    ///
    /// [`Error::RouteConflict`] if `(method, path)` is already taken.
    pub fn handle(&mut self, method: Method, path: &str, handler: impl Handler) -> Result<(), Error> {
        self.router.insert(method, path, endpoint(boxed(handler), None))
    }
}

impl Default for DebugMux {
    fn default() -> Self {
        Self::new()
    }
}

impl Mux for DebugMux {
    fn dispatch(&self, req: Request) -> BoxFuture<Response> {
        self.router.dispatch(req)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::Failure;

    fn get(path: &str) -> Request {
        http::Request::get(path).body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn serves_profiles_and_vars() {
        let vars = Vars::new();
        vars.publish("build", || serde_json::json!("test"));
        let mux = DebugMux::standard(vars).unwrap();

        let index = mux.dispatch(get("/debug/pprof/")).await;
        assert_eq!(index.status_code(), StatusCode::OK);
        let listing = String::from_utf8(index.body().to_vec()).unwrap();
        assert!(listing.contains("cmdline:"));
        #[cfg(unix)]
        assert!(listing.contains("profile:"));
        assert!(listing.contains("runtime:"));

        let cmdline = mux.dispatch(get("/debug/pprof/cmdline")).await;
        assert_eq!(cmdline.status_code(), StatusCode::OK);
        assert!(!cmdline.body().is_empty());

        let runtime = mux.dispatch(get("/debug/pprof/runtime")).await;
        let snapshot: serde_json::Value = serde_json::from_slice(runtime.body()).unwrap();
        assert!(snapshot["workers"].as_u64().unwrap() >= 1);

        let vars = mux.dispatch(get("/debug/vars")).await;
        let body: serde_json::Value = serde_json::from_slice(vars.body()).unwrap();
        assert_eq!(body["build"], "test");
        assert!(body["cmdline"].is_array());
    }

    #[tokio::test]
    async fn unknown_debug_path_is_not_found() {
        let mux = DebugMux::standard(Vars::new()).unwrap();
        let resp = mux.dispatch(get("/debug/pprof/heap")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_debug_route_fails() {
        let mut mux = DebugMux::standard(Vars::new()).unwrap();
        let err = mux
            .handle(Method::GET, "/debug/vars", |_: Context, _: ResponseWriter, _: Request| async {
                Err::<(), _>(Failure::internal("never bound"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cpu_profile_over_a_short_window() {
        let mux = DebugMux::standard(Vars::new()).unwrap();

        // Keep a core busy so the sampler has something to record.
        let busy = std::thread::spawn(|| {
            let until = std::time::Instant::now() + std::time::Duration::from_millis(1500);
            let mut x = 0u64;
            while std::time::Instant::now() < until {
                x = std::hint::black_box(x.wrapping_mul(31).wrapping_add(7));
            }
            x
        });

        let resp = mux.dispatch(get("/debug/pprof/profile?seconds=1")).await;
        busy.join().unwrap();

        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(!resp.body().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cpu_profile_rejects_a_bad_window() {
        let mux = DebugMux::standard(Vars::new()).unwrap();
        let resp = mux.dispatch(get("/debug/pprof/profile?seconds=never")).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_profile_is_unavailable() {
        let mux = DebugMux::standard(Vars::new()).unwrap();
        let token = tokio_util::sync::CancellationToken::new();
        let req = get("/debug/pprof/profile?seconds=30").with_cancellation(token.clone());

        let pending = mux.dispatch(req);
        token.cancel();
        let resp = tokio::time::timeout(std::time::Duration::from_secs(5), pending).await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
