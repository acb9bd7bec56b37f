//! Profiling endpoints under `/debug/pprof/`.

use std::fmt::Write as _;

use http::StatusCode;
use serde::Serialize;

use crate::context::Context;
use crate::error::Failure;
use crate::request::Request;
use crate::response::{ContentType, Response, ResponseWriter};

const CMDLINE: (&str, &str) =
    ("cmdline", "The command line invocation of the current process, NUL-separated.");
#[cfg(unix)]
const PROFILE: (&str, &str) = (
    "profile",
    "CPU profile as a flame graph. Sample duration in the `seconds` query parameter \
     (default 30). The profile starts right away.",
);
const RUNTIME: (&str, &str) =
    ("runtime", "A snapshot of the async runtime: worker threads and live tasks.");

/// Profiles listed by the index, relative to `/debug/pprof/`.
#[cfg(unix)]
pub(super) const PROFILES: &[(&str, &str)] = &[CMDLINE, PROFILE, RUNTIME];
#[cfg(not(unix))]
pub(super) const PROFILES: &[(&str, &str)] = &[CMDLINE, RUNTIME];

/// `GET /debug/pprof/`
pub(super) async fn index(_ctx: Context, w: ResponseWriter, _req: Request) -> Result<(), Failure> {
    let mut body = String::from("/debug/pprof/\n\nProfile Descriptions:\n\n");
    for (name, description) in PROFILES {
        let _ = writeln!(body, "{name}: {description}");
    }
    w.respond(Response::text(body))
}

/// `GET /debug/pprof/cmdline`
pub(super) async fn cmdline(_ctx: Context, w: ResponseWriter, _req: Request) -> Result<(), Failure> {
    let args: Vec<String> = std::env::args().collect();
    w.respond(
        Response::builder()
            .header("x-content-type-options", "nosniff")
            .bytes(ContentType::Text, args.join("\0")),
    )
}

#[derive(Debug, Serialize)]
struct RuntimeSnapshot {
    workers: usize,
    alive_tasks: usize,
}

/// `GET /debug/pprof/runtime`
pub(super) async fn runtime(_ctx: Context, w: ResponseWriter, _req: Request) -> Result<(), Failure> {
    let metrics = tokio::runtime::Handle::current().metrics();
    let snapshot = RuntimeSnapshot {
        workers: metrics.num_workers(),
        alive_tasks: metrics.num_alive_tasks(),
    };
    w.json(StatusCode::OK, &snapshot)
}

// ── CPU profile ──────────────────────────────────────────────────────────────

#[cfg(unix)]
pub(super) use cpu::profile;

#[cfg(unix)]
mod cpu {
    use std::time::Duration;

    use http::StatusCode;
    use tokio::time::Instant;

    use crate::context::Context;
    use crate::error::Failure;
    use crate::request::Request;
    use crate::response::{ContentType, Response, ResponseWriter};

    const DEFAULT_SECONDS: u64 = 30;
    const FREQUENCY_HZ: i32 = 99;
    /// How often the sampling thread checks whether the request was
    /// cancelled.
    const CANCEL_POLL: Duration = Duration::from_millis(50);

    /// `GET /debug/pprof/profile?seconds=N`
    ///
    /// Samples the whole process for `N` seconds and answers with an SVG
    /// flame graph. Only one profile can run at a time; a concurrent request
    /// gets `409`.
    pub(crate) async fn profile(ctx: Context, w: ResponseWriter, req: Request) -> Result<(), Failure> {
        let window = Duration::from_secs(seconds(req.query())?);
        if ctx.deadline().is_some_and(|deadline| deadline < Instant::now() + window) {
            return Err(Failure::bad_request("profile duration exceeds the request timeout"));
        }

        if ctx.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        let sampler = ctx.clone();
        let sampled = ctx
            .run(tokio::task::spawn_blocking(move || sample(&sampler, window)))
            .await?
            .map_err(|e| Failure::internal(format!("profiler task: {e}")))??;

        match sampled {
            Some(svg) => w.respond(
                Response::builder()
                    .header("x-content-type-options", "nosniff")
                    .header("content-disposition", r#"attachment; filename="profile.svg""#)
                    .bytes(ContentType::Svg, svg),
            ),
            None => w.respond(format!("no CPU samples collected in {}s", window.as_secs())),
        }
    }

    fn seconds(query: Option<&str>) -> Result<u64, Failure> {
        let raw = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .find_map(|pair| pair.strip_prefix("seconds="));
        match raw {
            None => Ok(DEFAULT_SECONDS),
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) | Err(_) => Err(Failure::bad_request("invalid seconds")
                    .with_field("seconds", "must be a positive integer")),
                Ok(n) => Ok(n),
            },
        }
    }

    /// Runs the profiler for `window` on the calling (blocking) thread.
    /// Returns `None` when the process was idle for the whole window.
    fn sample(ctx: &Context, window: Duration) -> Result<Option<Vec<u8>>, Failure> {
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(FREQUENCY_HZ)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .map_err(|e| match e {
                pprof::Error::Running => {
                    Failure::request(StatusCode::CONFLICT, "a CPU profile is already running")
                }
                e => Failure::internal(format!("starting CPU profiler: {e}")),
            })?;

        let until = std::time::Instant::now() + window;
        loop {
            let left = until.saturating_duration_since(std::time::Instant::now());
            if left.is_zero() {
                break;
            }
            if ctx.is_cancelled() {
                return Err(Failure::Cancelled);
            }
            std::thread::sleep(left.min(CANCEL_POLL));
        }

        let report = guard
            .report()
            .build()
            .map_err(|e| Failure::internal(format!("building CPU profile: {e}")))?;
        if report.data.is_empty() {
            return Ok(None);
        }

        let mut svg = Vec::new();
        report
            .flamegraph(&mut svg)
            .map_err(|e| Failure::internal(format!("rendering flame graph: {e}")))?;
        Ok(Some(svg))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn seconds_defaults_and_validates() {
            assert_eq!(seconds(None).unwrap(), DEFAULT_SECONDS);
            assert_eq!(seconds(Some("debug=1")).unwrap(), DEFAULT_SECONDS);
            assert_eq!(seconds(Some("debug=1&seconds=5")).unwrap(), 5);
            assert!(matches!(
                seconds(Some("seconds=0")),
                Err(Failure::Request { status: StatusCode::BAD_REQUEST, .. })
            ));
            assert!(seconds(Some("seconds=soon")).is_err());
        }
    }
}
