//! The HTTP server exposing metrics for scraping.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use perfstore_engine::Metrics;
use tokio::net::TcpListener;

/// Content type of the Prometheus text exposition format.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Creates the router with the `/metrics` and `/health` endpoints.
pub fn routes(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .with_state(metrics)
}

/// Serves the metrics endpoints until graceful shutdown is triggered.
pub async fn serve(listener: TcpListener, metrics: Arc<Metrics>) -> Result<()> {
    let guard = elegant_departure::get_shutdown_guard();

    axum::serve(listener, routes(metrics))
        .with_graceful_shutdown(guard.wait_owned())
        .await?;

    Ok(())
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], metrics.render())
}

async fn health() -> &'static str {
    "OK"
}
