use tokio::signal;
use tokio::sync::watch;

#[cfg(unix)]
async fn terminated() {
    use signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}

async fn interrupted() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}

/// Resolves on Ctrl+C or SIGTERM, whichever comes first.
pub(crate) async fn shutdown_signal() {
    let reason = tokio::select! {
        _ = interrupted() => "interrupt",
        _ = terminated() => "terminate",
    };
    tracing::info!(reason, "Shutting down");
}

/// Waits for a process signal and flips the watch flag so background loops can exit.
pub(crate) async fn broadcast_on_signal(tx: watch::Sender<bool>) {
    shutdown_signal().await;
    if tx.send(true).is_err() {
        tracing::warn!("No background loops listening for shutdown");
    }
}
