use axum::{extract::State, Json};
use std::sync::Arc;
use crate::models::HealthResponse;
use crate::state::AppState;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse::ok("Server is running"))
}

/// Readiness check endpoint
pub async fn ready_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Readiness check requested");
    Json(HealthResponse::ok(format!(
        "Service is ready ({} rooms resident, {} connections)",
        state.registry.len(),
        state.transport.connection_count()
    )))
}
