//! sales-api: the public API on one listener, the debug surface on another,
//! and a supervisor that drains both when the shutdown channel fires.
//!
//! Run with:
//!   RUST_LOG=info cargo run --bin sales-api -- [config.toml]
//!
//! Try:
//!   curl http://localhost:3000/v1/test
//!   curl http://localhost:4000/debug/liveness
//!   curl http://localhost:4000/debug/vars

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use corbel::config::{Config, LogFormat};
use corbel::debug::Vars;
use corbel::handlers::{self, ApiMuxConfig};
use corbel::middleware::Metrics;
use corbel::{Server, shutdown};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading config")?;

    init_tracing(config.log_format);
    let log = info_span!("sales-api", build = %config.build);

    let api_addr = config.web.api_addr()?;
    let debug_addr = config.web.debug_addr()?;

    // ── Shutdown channel ─────────────────────────────────────────────────────

    let (signal, listener) = shutdown::channel();
    tokio::spawn({
        let signal = signal.clone();
        async move {
            if let Err(e) = shutdown::forward_os_signals(signal).await {
                error!("installing signal handlers: {e}");
            }
        }
    });

    // ── Muxes ────────────────────────────────────────────────────────────────

    let vars = Vars::new();
    let build = config.build.clone();
    vars.publish("build", move || serde_json::Value::from(build.clone()));

    let metrics = Metrics::new();
    metrics.publish(&vars);

    let app = handlers::api_mux(ApiMuxConfig {
        shutdown: signal.clone(),
        log: log.clone(),
        metrics,
        panic_limit: config.panics.shutdown_after,
    })?;
    let debug = handlers::debug_mux(&config.build, log.clone(), vars, signal)?;

    // ── Listeners ────────────────────────────────────────────────────────────

    let stop = CancellationToken::new();

    // The debug listener is not part of the drain budget: it keeps answering
    // readiness probes (with 503) until the process exits.
    let debug_stop = CancellationToken::new();
    tokio::spawn({
        let debug_stop = debug_stop.clone();
        async move {
            if let Err(e) = Server::bind(debug_addr).name("debug").serve(debug, debug_stop).await {
                error!("debug listener: {e}");
            }
        }
    });

    let mut api = tokio::spawn(
        Server::bind(api_addr)
            .name("api")
            .request_timeout(config.web.request_timeout())
            .serve(app, stop.clone()),
    );

    info!(%api_addr, %debug_addr, build = %config.build, "started");

    // ── Supervision ──────────────────────────────────────────────────────────

    tokio::select! {
        res = &mut api => {
            debug_stop.cancel();
            res.context("api listener task")??;
            bail!("api listener stopped unexpectedly");
        }
        reason = listener.recv() => {
            info!(%reason, "shutdown started");
        }
    }

    stop.cancel();
    let drained = tokio::time::timeout(config.web.shutdown_timeout(), &mut api).await;
    debug_stop.cancel();

    match drained {
        Ok(res) => res.context("api listener task")??,
        Err(_) => {
            api.abort();
            bail!("could not stop the api gracefully within {:?}", config.web.shutdown_timeout());
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
