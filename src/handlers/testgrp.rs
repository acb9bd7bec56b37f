//! Test endpoint used to exercise the full middleware stack.

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::{Instrument, Span, debug};

use crate::context::Context;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::ResponseWriter;

pub struct Handlers {
    pub log: Span,
}

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

/// `GET /v1/test`
pub fn test(h: Arc<Handlers>) -> impl Handler {
    move |ctx: Context, w: ResponseWriter, _req: Request| {
        let span = h.log.clone();
        async move {
            ctx.run(tokio::task::yield_now()).await?;
            debug!(trace_id = %ctx.trace_id(), "test handler");
            w.json(StatusCode::OK, &Status { status: "ok" })
        }
        .instrument(span)
    }
}
