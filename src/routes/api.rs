use crate::{handlers::{diagnostics, health_check, kick_participant, ready_check}, routes::auth_middleware::auth_middleware, state::AppState};
use axum::{routing::{delete, get}, Router, middleware};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/rooms/:room_id/participants/:user_id", delete(kick_participant))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(state)
}
