//! Version-gated document edits.
//!
//! A patch is the whole new document. It is accepted only when the client
//! submits it against the version the room currently holds; anything else is
//! answered with a resync carrying the authoritative state.

use tracing::debug;

use crate::error::CollabError;
use crate::models::{
    CursorMessage, CursorUpdateMessage, EditAppliedMessage, EditMessage, ResyncMessage, ServerEvent,
};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied { version: u64 },
    Resync { version: u64 },
}

pub async fn apply_edit(state: &AppState, conn: &ConnCtx, edit: EditMessage) -> Result<EditOutcome, CollabError> {
    let max_bytes = state.limits.max_patch_bytes;
    if edit.patch.len() > max_bytes {
        return Err(CollabError::PatchTooLarge { max_bytes });
    }

    let mut lease = state
        .registry
        .acquire(&edit.room_id)
        .await
        .ok_or(CollabError::RoomNotLoaded)?;

    if !lease.has_participant(conn.user_id()) {
        return Err(CollabError::NotParticipant);
    }

    if edit.version != lease.version() {
        debug!(
            "Stale edit from {} on room {}: client at {}, room at {}",
            conn.user_id(),
            edit.room_id,
            edit.version,
            lease.version()
        );
        let resync = ResyncMessage {
            room_id: edit.room_id.clone(),
            document: lease.document().to_string(),
            version: lease.version(),
        };
        state
            .transport
            .send_to(&conn.connection_id, ServerEvent::Resync(resync));
        return Ok(EditOutcome::Resync { version: lease.version() });
    }

    let version = lease.apply_patch(edit.patch.clone());
    let applied = ServerEvent::Edit(EditAppliedMessage {
        room_id: edit.room_id.clone(),
        patch: edit.patch,
        version,
        user_id: conn.user_id().to_string(),
    });
    state
        .transport
        .broadcast(&edit.room_id, &applied, Some(&conn.connection_id));
    state.registry.schedule_persist(&mut lease);

    Ok(EditOutcome::Applied { version })
}

/// Best-effort cursor relay. No version check, nothing persisted.
pub fn relay_cursor(state: &AppState, conn: &ConnCtx, cursor: CursorMessage) -> Result<usize, CollabError> {
    if !state.transport.is_subscribed(&cursor.room_id, &conn.connection_id) {
        return Err(CollabError::NotParticipant);
    }

    let update = ServerEvent::CursorUpdate(CursorUpdateMessage {
        user_id: conn.user_id().to_string(),
        cursor: cursor.cursor,
    });
    Ok(state
        .transport
        .broadcast(&cursor.room_id, &update, Some(&conn.connection_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memstore::MemoryStore;
    use crate::models::{Cursor, JoinedMessage};
    use crate::services::presence_service::join_room;
    use crate::state::testing::{connect, drain, test_state};
    use std::sync::Arc;
    use std::time::Duration;

    fn edit(room_id: &str, patch: &str, version: u64) -> EditMessage {
        EditMessage {
            room_id: room_id.to_string(),
            patch: patch.to_string(),
            version,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_user_scenario() {
        let store = Arc::new(MemoryStore::open());
        let state = test_state(store.clone());
        let (alice, mut alice_rx) = connect(&state, "ca", "alice");
        let (bob, mut bob_rx) = connect(&state, "cb", "bob");

        let joined = join_room(&state, &alice, "r1").await.unwrap();
        assert_eq!(joined.document, "");
        assert_eq!(joined.version, 0);

        let outcome = apply_edit(&state, &alice, edit("r1", "hello", 0)).await.unwrap();
        assert_eq!(outcome, EditOutcome::Applied { version: 1 });
        drain(&mut alice_rx);

        let joined: JoinedMessage = join_room(&state, &bob, "r1").await.unwrap();
        assert_eq!(joined.document, "hello");
        assert_eq!(joined.version, 1);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let outcome = apply_edit(&state, &bob, edit("r1", "hello world", 0)).await.unwrap();
        assert_eq!(outcome, EditOutcome::Resync { version: 1 });
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::Resync(ResyncMessage {
                room_id: "r1".into(),
                document: "hello".into(),
                version: 1,
            })]
        );
        assert!(drain(&mut alice_rx).is_empty());

        let outcome = apply_edit(&state, &bob, edit("r1", "hello world", 1)).await.unwrap();
        assert_eq!(outcome, EditOutcome::Applied { version: 2 });
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::Edit(EditAppliedMessage {
                room_id: "r1".into(),
                patch: "hello world".into(),
                version: 2,
                user_id: "bob".into(),
            })]
        );
        assert!(drain(&mut bob_rx).is_empty());

        // one debounced write with the latest content
        tokio::time::sleep(Duration::from_millis(2501)).await;
        let saves = store.saves_for("r1");
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].content, "hello world");
        assert_eq!(saves[0].version, 2);
    }

    #[tokio::test]
    async fn oversized_patch_is_rejected_even_at_current_version() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let (alice, _rx) = connect(&state, "ca", "alice");
        join_room(&state, &alice, "r1").await.unwrap();

        let patch = "x".repeat(50 * 1024 + 1);
        let err = apply_edit(&state, &alice, edit("r1", &patch, 0)).await.unwrap_err();
        assert!(matches!(err, CollabError::PatchTooLarge { .. }));

        let lease = state.registry.acquire("r1").await.unwrap();
        assert_eq!(lease.version(), 0);
        assert_eq!(lease.document(), "");
    }

    #[tokio::test]
    async fn patch_at_the_limit_is_accepted() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let (alice, _rx) = connect(&state, "ca", "alice");
        join_room(&state, &alice, "r1").await.unwrap();

        let patch = "x".repeat(50 * 1024);
        let outcome = apply_edit(&state, &alice, edit("r1", &patch, 0)).await.unwrap();
        assert_eq!(outcome, EditOutcome::Applied { version: 1 });
    }

    #[tokio::test]
    async fn non_participants_cannot_edit() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let (alice, _a) = connect(&state, "ca", "alice");
        let (mallory, _m) = connect(&state, "cm", "mallory");

        let err = apply_edit(&state, &mallory, edit("r1", "x", 0)).await.unwrap_err();
        assert!(matches!(err, CollabError::RoomNotLoaded));

        join_room(&state, &alice, "r1").await.unwrap();
        let err = apply_edit(&state, &mallory, edit("r1", "x", 0)).await.unwrap_err();
        assert!(matches!(err, CollabError::NotParticipant));

        let lease = state.registry.acquire("r1").await.unwrap();
        assert_eq!(lease.version(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_edits_at_one_version_have_one_winner() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let mut users = Vec::new();
        for i in 0..8 {
            let (ctx, rx) = connect(&state, &format!("c{}", i), &format!("user-{}", i));
            join_room(&state, &ctx, "r1").await.unwrap();
            users.push((ctx, rx));
        }

        let mut tasks = Vec::new();
        for (ctx, _) in &users {
            let state = state.clone();
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                let patch = format!("from {}", ctx.user_id());
                apply_edit(&state, &ctx, edit("r1", &patch, 0)).await.unwrap()
            }));
        }

        let mut applied = 0;
        let mut resynced = 0;
        for task in tasks {
            match task.await.unwrap() {
                EditOutcome::Applied { version } => {
                    assert_eq!(version, 1);
                    applied += 1;
                }
                EditOutcome::Resync { version } => {
                    assert_eq!(version, 1);
                    resynced += 1;
                }
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(resynced, 7);
        assert_eq!(state.registry.acquire("r1").await.unwrap().version(), 1);
    }

    #[tokio::test]
    async fn cursor_is_relayed_to_others_only() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let (alice, mut alice_rx) = connect(&state, "ca", "alice");
        let (bob, mut bob_rx) = connect(&state, "cb", "bob");
        let (eve, _eve_rx) = connect(&state, "ce", "eve");
        join_room(&state, &alice, "r1").await.unwrap();
        join_room(&state, &bob, "r1").await.unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let cursor = CursorMessage {
            room_id: "r1".into(),
            cursor: Cursor { line: 3, ch: 14 },
        };
        assert_eq!(relay_cursor(&state, &alice, cursor.clone()).unwrap(), 1);
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::CursorUpdate(CursorUpdateMessage {
                user_id: "alice".into(),
                cursor: Cursor { line: 3, ch: 14 },
            })]
        );

        assert!(matches!(
            relay_cursor(&state, &eve, cursor),
            Err(CollabError::NotParticipant)
        ));
    }
}
