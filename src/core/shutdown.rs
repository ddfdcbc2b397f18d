//! # Parent-side shutdown signal.
//!
//! Provides [`wait_for_shutdown_signal`], an async helper used by
//! `ServerCollection::run_until_signal`. It completes on the first of:
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT`
//!
//! These listeners belong to the parent's tokio runtime. A forked child resets
//! every disposition when its signal table is installed.

use tokio::signal::unix::{SignalKind, signal};

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners. Returns `Err` if signal
/// registration fails.
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}
