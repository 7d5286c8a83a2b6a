use tracing::info;

use crate::error::CollabError;
use crate::services::presence_service::{force_leave, leave_room};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

pub async fn handle_leave_message(state: &AppState, conn: &ConnCtx, room_id: &str) -> Result<(), CollabError> {
    leave_room(state, conn.user_id(), &conn.connection_id, room_id).await;
    Ok(())
}

/// Remove this connection from the room and tell it it was kicked.
pub async fn handle_force_leave_message(state: &AppState, conn: &ConnCtx, room_id: &str) -> Result<(), CollabError> {
    info!("Force-leave of room {} for connection {}", room_id, conn.connection_id);
    force_leave(state, conn, room_id).await;
    Ok(())
}
