//! Signal handling for graceful shutdown.

use tokio::signal::unix::{signal, SignalKind};

/// Completes when SIGTERM or SIGINT arrives.
///
/// Resolving this future stops payment intake; payments already on the
/// queue keep processing until the pipeline teardown that follows.
pub async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("no SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("no SIGINT handler");

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = received, "Shutdown signal received, closing payment intake");
}
