use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel the returned token on SIGTERM or SIGINT. The HTTP server, the watchdog and any
/// restart waiting out its settle delay all watch it.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        trigger.cancel();
    });

    Ok(token)
}

/// Resolve once `token` is cancelled, for `axum::serve(..).with_graceful_shutdown`.
pub async fn wait(token: CancellationToken) {
    token.cancelled().await;
    warn!("no longer accepting requests");
}
