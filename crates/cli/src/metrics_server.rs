use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use mev_shield_telemetry::Metrics;
use std::net::SocketAddr;
use tracing::{error, info};

async fn metrics_handler(State(metrics): State<Metrics>) -> Result<impl IntoResponse, StatusCode> {
    match metrics.gather() {
        Ok(body) => Ok((StatusCode::OK, body)),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Serve `/metrics` in the background. Returns the bound address, which
/// differs from `addr` when binding port 0.
pub async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!("Metrics server listening on http://{}", local);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(metrics)).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(local)
}
