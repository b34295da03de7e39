use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Resolves on SIGTERM (Kubernetes pod termination), SIGINT or ctrl-c.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to listen for SIGINT");

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
    info!("ctrl-c received");
}

/// Cancel `token` on the first shutdown signal.
///
/// The task also ends quietly if `token` is cancelled by someone else first.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received, stopping relay");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}
