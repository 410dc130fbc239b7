//! Optional status server.
//!
//! Routes:
//! - `GET /health`  liveness check, always `ok`
//! - `GET /status`  JSON summary of the last completed polling cycle
//! - `GET /metrics` Prometheus text exposition

pub mod health;
pub mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::metrics::AppMetrics;
use crate::scheduler::CycleStatus;

/// Shared state for the status routes.
#[derive(Clone)]
pub struct StatusState {
    pub metrics: Arc<AppMetrics>,
    pub status: watch::Receiver<CycleStatus>,
}

pub fn create_router(metrics: Arc<AppMetrics>, status: watch::Receiver<CycleStatus>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/status", get(health::status))
        .route("/metrics", get(metrics::metrics))
        .with_state(StatusState { metrics, status })
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` on `addr` until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
