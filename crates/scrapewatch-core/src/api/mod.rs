//! Status HTTP server
//!
//! Read-only view of the scheduler for probes and dashboards.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::collector::StatusBoard;
use crate::error::{Error, Result};

/// HTTP status server
pub struct StatusServer {
    state: AppState,
}

impl StatusServer {
    /// Create a new status server
    pub fn new(status: StatusBoard, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            state: AppState { status, metrics },
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = create_router(self.state)
            .layer(TraceLayer::new_for_http())
            .layer(cors);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("failed to bind {addr}: {e}")))?;

        info!("Status server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}
