//! Failure logging.

use std::sync::Arc;

use tracing::{error, warn};

use super::{BoxedMiddleware, boxed};
use crate::context::Context;
use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Logs every failure coming out of the inner chain with its trace id and
/// hands it on untouched. Caller mistakes (`4xx`) log at `warn`, everything
/// else at `error`.
pub fn errors() -> BoxedMiddleware {
    boxed(|next: BoxedHandler| -> BoxedHandler {
        Arc::new(move |ctx: Context, w: ResponseWriter, req: Request| {
            let next = Arc::clone(&next);
            async move {
                let outcome = next.call(ctx.clone(), w, req).await;
                if let Err(failure) = &outcome {
                    let status = failure.status();
                    if status.is_client_error() {
                        warn!(trace_id = %ctx.trace_id(), status = status.as_u16(), "{failure}");
                    } else {
                        error!(trace_id = %ctx.trace_id(), status = status.as_u16(), "{failure}");
                    }
                }
                outcome
            }
        })
    })
}
