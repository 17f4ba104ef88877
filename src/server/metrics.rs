//! Metrics endpoint for the prober
//!
//! `/metrics` serves the Prometheus text exposition of the probe counters.

use crate::prober::Aggregator;
use crate::server::ShutdownSignal;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long the metrics listener may take to close after cancellation
pub const METRICS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum MetricsServerError {
    #[error("serve metrics: {0}")]
    Serve(#[from] std::io::Error),

    #[error("metrics server did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Prometheus metrics handler
async fn metrics(State(aggregator): State<Arc<Aggregator>>) -> impl IntoResponse {
    let _scrape = aggregator.begin_scrape();

    match aggregator.encode() {
        Ok(body) => {
            aggregator.record_scrape(StatusCode::OK.as_u16());
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Err(e) => {
            aggregator.record_scrape(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Build the router for the metrics endpoint
pub fn build_router(aggregator: Arc<Aggregator>) -> Router {
    Router::new()
        .route("/metrics", get(self::metrics))
        .with_state(aggregator)
}

/// Serve the metrics endpoint until `signal` fires
///
/// After cancellation the listener stops accepting and open connections get
/// `shutdown_timeout` to finish.
pub async fn run_metrics_server(
    listener: TcpListener,
    aggregator: Arc<Aggregator>,
    mut signal: ShutdownSignal,
    shutdown_timeout: Duration,
) -> Result<(), MetricsServerError> {
    let app = build_router(aggregator);

    // Log after successful bind - server is actually listening
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "Metrics server listening");
    }

    let mut drain = signal.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { drain.wait().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(MetricsServerError::from),
        _ = signal.wait() => {}
    }

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => {
            info!("Metrics server stopped");
            result.map_err(MetricsServerError::from)
        }
        Err(_) => {
            warn!(timeout = ?shutdown_timeout, "Metrics server shutdown timed out");
            Err(MetricsServerError::ShutdownTimeout(shutdown_timeout))
        }
    }
}
