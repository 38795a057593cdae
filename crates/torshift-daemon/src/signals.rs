//! OS signal to cancellation mapping.
//!
//! The listener only cancels the token. The shutdown message and cleanup
//! happen on the control path once the rotation loop observes the
//! cancellation.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Spawn a task that cancels `token` on SIGINT (Ctrl+C) or SIGTERM.
///
/// Cancellation is idempotent, so repeated signals have no further effect.
/// The task ends with a warning if a signal source can no longer be awaited.
pub fn spawn_signal_listener(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let sigterm_future = sigterm.recv();
            #[cfg(not(unix))]
            let sigterm_future = std::future::pending::<Option<()>>();

            let delivered = tokio::select! {
                res = tokio::signal::ctrl_c() => res,
                res = sigterm_future => {
                    res.ok_or_else(|| std::io::Error::other("SIGTERM stream closed"))
                }
            };
            if !on_signal(&token, delivered) {
                break;
            }
        }
    }))
}

/// Apply one signal delivery to `token`.
///
/// Returns `false` when the listener should stop because the signal source
/// failed.
fn on_signal(token: &CancellationToken, delivered: std::io::Result<()>) -> bool {
    match delivered {
        Ok(()) => {
            token.cancel();
            debug!("Termination signal received; cancellation requested");
            true
        }
        Err(e) => {
            warn!(
                error = %e,
                "Signal listener stopped; SIGINT/SIGTERM will no longer stop the loop"
            );
            false
        }
    }
}
