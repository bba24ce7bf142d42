//! Ingress HTTP server.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serve the ingress API until a shutdown signal arrives.
///
/// Binds the listener, applies the shared state to the ingress router, and
/// serves with graceful shutdown. Returning here means intake has stopped;
/// the caller then tears down the processing pipeline.
pub async fn run_ingress(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Payment ingress listening");

    let router = api::router().with_state(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
