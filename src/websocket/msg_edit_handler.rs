use tracing::debug;

use crate::error::CollabError;
use crate::models::{CursorMessage, EditMessage};
use crate::services::doc_edit_service::{apply_edit, relay_cursor, EditOutcome};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Handle an edit. A version mismatch is not an error: the sender already got a resync.
pub async fn handle_edit_message(state: &AppState, conn: &ConnCtx, edit: EditMessage) -> Result<(), CollabError> {
    let room_id = edit.room_id.clone();
    match apply_edit(state, conn, edit).await? {
        EditOutcome::Applied { version } => {
            debug!("Edit by {} applied to room {}, now at version {}", conn.user_id(), room_id, version)
        }
        EditOutcome::Resync { version } => {
            debug!("Edit by {} on room {} resynced to version {}", conn.user_id(), room_id, version)
        }
    }
    Ok(())
}

pub fn handle_cursor_message(state: &AppState, conn: &ConnCtx, cursor: CursorMessage) -> Result<(), CollabError> {
    relay_cursor(state, conn, cursor)?;
    Ok(())
}
