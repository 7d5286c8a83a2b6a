use tracing::debug;

use crate::error::CollabError;
use crate::models::ChatSendMessage;
use crate::services::chat_service::send_chat;
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

pub async fn handle_chat_message(state: &AppState, conn: &ConnCtx, message: ChatSendMessage) -> Result<(), CollabError> {
    let record = send_chat(state, conn, message).await?;
    debug!("Chat message {} stored for room {}", record.id, record.room_id);
    Ok(())
}
