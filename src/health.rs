//! Liveness endpoint for the process supervisor

use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::AisStreamerError;

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
}

/// Always answers `{"status":"ok"}`, whatever the feed is doing
async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

pub async fn serve(bind: SocketAddr) -> Result<(), AisStreamerError> {
    let listener = TcpListener::bind(bind).await?;
    info!("Health endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, router()).await?;
    Ok(())
}
