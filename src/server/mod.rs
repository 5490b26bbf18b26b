//! HTTP surface (feature `server`).
//!
//! [`router`] builds the axum `Router`; [`serve`] binds it and runs until
//! Ctrl+C or SIGTERM.

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{router, OWNER_HEADER};

use crate::service::OcrService;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Bind `addr` and serve until a shutdown signal arrives.
pub async fn serve(
    service: Arc<OcrService>,
    addr: SocketAddr,
    request_timeout: Duration,
) -> io::Result<()> {
    let app = router(service, request_timeout);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %addr, error = %err, "Failed to bind to address");
            return Err(err);
        }
    };
    tracing::info!(
        addr = %addr,
        request_timeout_sec = request_timeout.as_secs(),
        "Server is ready and listening for connections"
    );
    if addr.ip().is_unspecified() {
        tracing::warn!("Server is bound to all interfaces. Ensure firewall rules are properly configured.");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        } else {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix;
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!("Received SIGTERM signal, initiating graceful shutdown");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
