use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Live room, connection and host counters (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Remove a user from a live room (admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/rooms/{room_id}/participants/{user_id}",
    params(
        ("room_id" = String, Path, description = "Room id"),
        ("user_id" = String, Path, description = "User to remove")
    ),
    responses(
        (status = 200, description = "Kick processed; `kicked` is false when the user was not present", body = KickResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn kick_participant_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        kick_participant_doc,
    ),
    components(
        schemas(HealthResponse, DiagnosticsResponse, KickResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
