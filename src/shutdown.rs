use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancellation token wired to SIGINT and SIGTERM.
///
/// Cancelling it stops the Raft timer loop (which drops the cached peer
/// clients) and drains both gRPC planes through `serve_with_shutdown`;
/// in-flight RPCs finish or hit their deadlines.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Could not install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }

        trigger.cancel();
    });

    token
}
