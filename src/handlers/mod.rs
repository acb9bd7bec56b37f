//! Route tables of the sales API.
//!
//! [`api_mux`] builds the public [`App`] and binds each API version onto
//! it; [`debug_mux`] builds the operational [`DebugMux`]. The two are
//! served on different listeners and share nothing but the shutdown
//! signal.

use std::sync::Arc;

use http::Method;
use tracing::Span;

use crate::app::App;
use crate::debug::{DebugMux, Vars};
use crate::error::Error;
use crate::middleware::{self, Logger, Metrics, Panics};
use crate::shutdown::ShutdownSignal;

pub mod checkgrp;
pub mod testgrp;

/// Everything the API handlers need from the process.
#[derive(Clone)]
pub struct ApiMuxConfig {
    pub shutdown: ShutdownSignal,
    pub log: Span,
    pub metrics: Arc<Metrics>,
    /// See [`Panics::shutdown_after`].
    pub panic_limit: Option<u64>,
}

/// Builds the public application with the standard middleware stack,
/// outermost first: logging, failure logging, metrics, panic recovery.
pub fn api_mux(cfg: ApiMuxConfig) -> Result<App, Error> {
    let mut panics = Panics::new(Arc::clone(&cfg.metrics));
    if let Some(limit) = cfg.panic_limit {
        panics = panics.shutdown_after(limit);
    }

    let mut app = App::new(
        cfg.shutdown.clone(),
        vec![
            middleware::boxed(Logger::new(cfg.log.clone())),
            middleware::errors(),
            middleware::metrics(Arc::clone(&cfg.metrics)),
            middleware::boxed(panics),
        ],
    );

    v1(&mut app, &cfg)?;
    Ok(app)
}

/// Binds the version 1 routes.
fn v1(app: &mut App, cfg: &ApiMuxConfig) -> Result<(), Error> {
    const VERSION: &str = "v1";

    let tgh = Arc::new(testgrp::Handlers { log: cfg.log.clone() });
    app.handle(Method::GET, VERSION, "/test", testgrp::test(tgh), &[])?;
    Ok(())
}

/// Builds the debug mux: profiling and exported variables, plus the
/// liveness and readiness checks.
pub fn debug_mux(build: &str, log: Span, vars: Vars, shutdown: ShutdownSignal) -> Result<DebugMux, Error> {
    let mut mux = DebugMux::standard(vars)?;

    let cgh = Arc::new(checkgrp::Handlers {
        build: build.to_owned(),
        log,
        shutdown,
    });
    mux.handle(Method::GET, "/debug/readiness", checkgrp::readiness(Arc::clone(&cgh)))?;
    mux.handle(Method::GET, "/debug/liveness", checkgrp::liveness(cgh))?;
    Ok(mux)
}
