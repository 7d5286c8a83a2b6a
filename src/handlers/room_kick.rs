use crate::{auth::auth::{self, Identity}, models::{ErrorResponse, KickResponse}, services::presence_service, state::AppState};
use axum::{extract::{Extension, Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

/// Remove a user from a live room and notify their connection
pub async fn kick_participant(
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
    Extension(identity): Extension<Identity>,
) -> Result<(StatusCode, Json<KickResponse>), (StatusCode, Json<ErrorResponse>)> {

    auth::ensure_admin(&identity)?;

    info!("Admin {} kicking user {} from room {}", identity.user_id, user_id, room_id);
    let kicked = presence_service::kick(&state, &room_id, &user_id).await;

    Ok((
        StatusCode::OK,
        Json(KickResponse {
            room_id,
            user_id,
            kicked,
        }),
    ))
}
