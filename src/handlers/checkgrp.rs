//! Liveness and readiness checks.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/debug/liveness` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/debug/readiness` | Can it serve traffic? Failure → pulled from the load balancer. |

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::{Instrument, Span, info};

use crate::context::Context;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::shutdown::ShutdownSignal;

pub struct Handlers {
    pub build: String,
    pub log: Span,
    pub shutdown: ShutdownSignal,
}

#[derive(Debug, Serialize)]
struct Readiness {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct Liveness {
    status: &'static str,
    build: String,
    host: String,
    pod: String,
    pod_ip: String,
    node: String,
    namespace: String,
}

/// Ready while no shutdown has been requested. Once one has, answers
/// `503` so the load balancer stops sending traffic during the drain.
pub fn readiness(h: Arc<Handlers>) -> impl Handler {
    move |ctx: Context, w: ResponseWriter, _req: Request| {
        let h = Arc::clone(&h);
        let span = h.log.clone();
        async move {
            let (status, body) = if h.shutdown.is_requested() {
                (StatusCode::SERVICE_UNAVAILABLE, Readiness { status: "shutting down" })
            } else {
                (StatusCode::OK, Readiness { status: "ok" })
            };
            info!(trace_id = %ctx.trace_id(), status = status.as_u16(), "readiness");
            w.json(status, &body)
        }
        .instrument(span)
    }
}

/// Always `200` with the build and, when running on Kubernetes, where the
/// pod is scheduled. If the process can answer at all, it is alive.
pub fn liveness(h: Arc<Handlers>) -> impl Handler {
    move |ctx: Context, w: ResponseWriter, _req: Request| {
        let h = Arc::clone(&h);
        let span = h.log.clone();
        async move {
            let body = Liveness {
                status: "up",
                build: h.build.clone(),
                host: env_or_unavailable("HOSTNAME"),
                pod: env_or_unavailable("KUBERNETES_PODNAME"),
                pod_ip: env_or_unavailable("KUBERNETES_NAMESPACE_POD_IP"),
                node: env_or_unavailable("KUBERNETES_NODENAME"),
                namespace: env_or_unavailable("KUBERNETES_NAMESPACE"),
            };
            info!(trace_id = %ctx.trace_id(), "liveness");
            w.json(StatusCode::OK, &body)
        }
        .instrument(span)
    }
}

fn env_or_unavailable(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| "unavailable".to_owned())
}
