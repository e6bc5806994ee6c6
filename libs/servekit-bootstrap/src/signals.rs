use std::fmt;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Signal that ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    CtrlC,
    Sigterm,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CtrlC => "Ctrl+C",
            Self::Sigterm => "SIGTERM",
        })
    }
}

/// Wait for Ctrl+C or SIGTERM.
///
/// # Errors
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    let received = tokio::select! {
        r = ctrl_c() => r?,
        r = sigterm() => r?,
    };
    tracing::info!(signal = %received, "Shutdown signal received, stopping host");
    Ok(received)
}

/// Cancel `token` once a shutdown signal arrives. A failure to install the
/// handlers cancels it too.
pub fn cancel_on_shutdown(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            tracing::error!(error = %e, "Signal handling failed");
        }
        token.cancel();
    })
}

async fn ctrl_c() -> Result<ShutdownSignal> {
    signal::ctrl_c().await?;
    Ok(ShutdownSignal::CtrlC)
}

#[cfg(unix)]
async fn sigterm() -> Result<ShutdownSignal> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    term.recv().await;
    Ok(ShutdownSignal::Sigterm)
}

#[cfg(not(unix))]
async fn sigterm() -> Result<ShutdownSignal> {
    std::future::pending().await
}
