use tracing::info;

use crate::error::CollabError;
use crate::services::presence_service::join_room;
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Handle a join. The joined reply is sent by the presence service.
pub async fn handle_join_message(state: &AppState, conn: &ConnCtx, room_id: &str) -> Result<(), CollabError> {
    info!("Join received for room {} from user {}", room_id, conn.user_id());
    join_room(state, conn, room_id).await?;
    Ok(())
}
