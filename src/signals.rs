use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancel the given token on the first shutdown signal. Crawls watching the token (or a child of
/// it) stop at their next request or backoff, and report as cancelled.
pub fn cancel_on_shutdown(token: CancellationToken) -> Result<()> {
    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = int.recv() => "SIGINT",
            _ = term.recv() => "SIGTERM",
            _ = hup.recv() => "SIGHUP",
            _ = quit.recv() => "SIGQUIT",
            _ = token.cancelled() => return,
        };
        warn!(signal = name, "Shutdown requested, cancelling crawls");
        token.cancel();
    });
    Ok(())
}
