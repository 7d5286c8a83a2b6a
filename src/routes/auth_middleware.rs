use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

/// Authenticate the request and put the caller's `Identity` into the request
/// extensions for downstream handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // Get the auth token from the request
    let token = match get_auth_token(req.headers(), None) {
        Ok(token) => token,
        Err(e) => {
            debug!("Rejecting {}: {}", req.uri().path(), e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // Validate the token
    let identity = match state.auth.verify(&token) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
