//! REST API implementation
//!
//! HTTP API over stored snapshots and live balances, plus swap intake.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::balance::BalanceAggregator;
use crate::db::SnapshotStore;
use crate::error::{Error, Result};
use crate::monitor::BalanceMonitor;

/// HTTP API server
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server. Without a monitor, swap reports are refused.
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        aggregator: BalanceAggregator,
        monitor: Option<Arc<BalanceMonitor>>,
    ) -> Self {
        Self {
            state: AppState {
                store,
                aggregator,
                monitor,
            },
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
            .layer(cors)
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(addr).await?;

        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}
