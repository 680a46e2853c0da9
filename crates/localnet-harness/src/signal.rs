//! OS termination signals.

use localnet_core::{CancelToken, CancellationSource};
use tokio::signal;

/// Resolve on Ctrl+C or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

/// Resolve on Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> std::io::Result<()> {
    signal::ctrl_c().await
}

/// Cancel `source` when a termination signal arrives.
///
/// Returns once the signal fired or the run was cancelled some other way.
pub async fn cancel_on_signal(source: CancellationSource, token: CancelToken) {
    tokio::select! {
        received = shutdown_signal() => match received {
            Ok(()) => {
                tracing::info!("termination signal received; shutting down");
                source.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "could not install signal handler"),
        },
        _ = token.cancelled() => {}
    }
}
