//! Shutdown signaling.
//!
//! The [`App`](crate::App) cannot stop the process. It can only ask: when a
//! handler chain reports an integrity failure, or code calls
//! [`App::signal_shutdown`](crate::App::signal_shutdown), a request goes out
//! on this channel. The supervisor in `main` is the only receiver and the
//! only one that stops listeners.
//!
//! Sending never blocks and never fails. Many request tasks may signal at
//! once; the supervisor observes at least one signal, and the reason of the
//! first one is kept.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;
use tracing::info;

/// Why the process is shutting down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM, or an explicit [`App::signal_shutdown`](crate::App::signal_shutdown).
    Terminate,
    /// A handler chain reported an unrecoverable failure.
    Integrity(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt"),
            Self::Terminate => f.write_str("terminate"),
            Self::Integrity(detail) => write!(f, "integrity failure: {detail}"),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    /// Set exactly once, by the call that flips the channel.
    reason: OnceLock<ShutdownReason>,
    notify: Notify,
}

/// Send side of the shutdown channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    shared: Arc<Shared>,
}

/// Receive side of the shutdown channel, held by the supervisor.
#[derive(Debug)]
pub struct ShutdownListener {
    shared: Arc<Shared>,
}

/// Creates a connected signal/listener pair.
pub fn channel() -> (ShutdownSignal, ShutdownListener) {
    let shared = Arc::new(Shared::default());
    (ShutdownSignal { shared: Arc::clone(&shared) }, ShutdownListener { shared })
}

impl ShutdownSignal {
    /// Requests a shutdown. Returns `true` for the one call that flipped the
    /// channel, whose reason is the one recorded; later calls are no-ops
    /// that return `false`.
    pub fn signal(&self, reason: ShutdownReason) -> bool {
        if self.shared.reason.set(reason).is_err() {
            return false;
        }
        self.shared.notify.notify_waiters();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.shared.reason.get().is_some()
    }
}

impl ShutdownListener {
    /// Resolves once a shutdown has been requested, returning the first
    /// recorded reason. Returns immediately if one already was.
    pub async fn recv(&self) -> ShutdownReason {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking the reason, or a signal landing in
            // between would be missed.
            notified.as_mut().enable();

            if let Some(reason) = self.shared.reason.get() {
                return reason.clone();
            }
            notified.await;
        }
    }

    pub fn is_requested(&self) -> bool {
        self.shared.reason.get().is_some()
    }
}

// ── OS signals ────────────────────────────────────────────────────────────────

/// Forwards the first SIGTERM or SIGINT the process receives onto the
/// shutdown channel. Run it as a background task.
///
/// On Windows only Ctrl-C is available.
pub async fn forward_os_signals(signal: ShutdownSignal) -> std::io::Result<()> {
    let reason = os_signal().await?;
    info!(%reason, "os signal received");
    signal.signal(reason);
    Ok(())
}

async fn os_signal() -> std::io::Result<ShutdownReason> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|()| ShutdownReason::Interrupt),
            _ = sigterm.recv() => Ok(ShutdownReason::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownReason::Interrupt)
    }
}
