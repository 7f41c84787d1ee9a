use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn probe_router(started: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(started)
        .layer(TraceLayer::new_for_http())
}

async fn readyz(State(started): State<Arc<AtomicBool>>) -> (StatusCode, &'static str) {
    if started.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

/// Bind the probe port. Fails fast when the address is already in use.
pub async fn bind_probe_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("unable to bind probe server on {addr}"))?;
    info!("probe server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve `/healthz` and `/readyz` on `listener` until `shutdown` fires.
pub async fn run_probe_server(
    listener: TcpListener,
    started: Arc<AtomicBool>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = probe_router(started);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
