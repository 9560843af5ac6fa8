//! Liveness and readiness probes
//!
//! `/healthz` answers as long as the process serves HTTP. `/readyz` answers 503
//! until startup finished, then 200. A standby replica waiting for leadership
//! counts as ready.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Error;

/// Shared readiness flag flipped by `main` once the controller runs
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Mark the operator ready
    pub fn set_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the operator is ready
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

async fn readyz(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Build the probe router
pub fn probe_routes(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

/// Bind the probe listener
///
/// Done before the controller starts so a taken port fails startup.
pub async fn bind_probes(addr: SocketAddr) -> Result<TcpListener, Error> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::ProbeServer { addr, source })
}

/// Serve the probes on `listener` until `shutdown` is cancelled
pub async fn serve_probes(
    listener: TcpListener,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let addr = listener
        .local_addr()
        .map_err(|source| Error::ProbeServer {
            addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            source,
        })?;
    info!(addr = %addr, "Probe server started");

    axum::serve(listener, probe_routes(readiness))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|source| Error::ProbeServer { addr, source })
}
