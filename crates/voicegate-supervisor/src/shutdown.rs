//! Operator shutdown signals.

use std::io;

/// SIGINT/SIGTERM listener.
///
/// Handlers are registered in [`ShutdownSignal::install`], before any unit is
/// launched, so a signal that arrives during startup is queued rather than
/// killing the supervisor outright.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot install a handler.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next shutdown signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {
                tracing::info!("received SIGINT, stopping all units");
            }
            _ = self.terminate.recv() => {
                tracing::info!("received SIGTERM, stopping all units");
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, stopping all units");
    }
}
