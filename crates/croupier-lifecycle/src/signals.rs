//! # OS Signals
//!
//! [`wait_for_shutdown_signal`] resolves when the process is asked to stop:
//! SIGINT, SIGTERM or SIGQUIT on Unix, Ctrl-C elsewhere.

use std::fmt;

/// The signal that triggered shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl-C / SIGINT.
    Interrupt,
    /// SIGTERM (systemd, container runtimes).
    Terminate,
    /// SIGQUIT.
    Quit,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// Wait for a termination signal.
///
/// Listeners are installed per call.
///
/// # Errors
///
/// Fails if a signal handler cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = sigint.recv() => ShutdownSignal::Interrupt,
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigquit.recv() => ShutdownSignal::Quit,
    };
    tracing::info!(signal = %received, "[Shutdown] Signal received");
    Ok(received)
}

/// Wait for a termination signal.
///
/// # Errors
///
/// Fails if the Ctrl-C handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("[Shutdown] Ctrl-C received");
    Ok(ShutdownSignal::Interrupt)
}
