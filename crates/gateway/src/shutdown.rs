//! Graceful shutdown signal (A5) — spec §5 "stop accepting new requests;
//! drain in-flight requests...".

use tokio::signal;
use tracing::info;

/// Resolves on SIGTERM (or Ctrl-C on platforms without SIGTERM) so
/// `axum::serve(...).with_graceful_shutdown(...)` can stop accepting new
/// connections while letting in-flight requests finish.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
