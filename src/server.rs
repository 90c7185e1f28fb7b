//! Exposition Server: serves the registry over HTTP for Prometheus scrapes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::ExporterError;
use crate::registry::MetricsContext;

/// Port the exporter listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8000;

/// Path scraped by Prometheus.
pub const METRICS_PATH: &str = "/metrics";

pub fn router(ctx: Arc<MetricsContext>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(ctx)
}

async fn metrics_handler(State(ctx): State<Arc<MetricsContext>>) -> Response {
    match ctx.render() {
        Ok(body) => {
            debug!(bytes = body.len(), "Served scrape");
            ([(header::CONTENT_TYPE, ctx.content_type())], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Binds the listening socket. Failure here is fatal for the process.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ExporterError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ExporterError::ServerStart { addr, source })?;
    info!(%addr, path = METRICS_PATH, "Exposition server listening");
    Ok(listener)
}

/// Serves scrapes until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<MetricsContext>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}
