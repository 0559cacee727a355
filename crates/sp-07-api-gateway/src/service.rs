//! # HTTP Server

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Serve `router` until the shutdown flag flips.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "[sp-07] HTTP server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("[sp-07] HTTP server shutting down");
        })
        .await
}
