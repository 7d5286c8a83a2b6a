use tracing::{debug, error};

use crate::error::CollabError;
use crate::models::{ChatRecord, ChatSendMessage, ServerEvent};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Validate, throttle, store and broadcast one chat message. The stored
/// record goes to every subscriber of the room, the sender included.
pub async fn send_chat(state: &AppState, conn: &ConnCtx, message: ChatSendMessage) -> Result<ChatRecord, CollabError> {
    let content = message.content.trim();
    if content.is_empty() {
        return Err(CollabError::InvalidPayload("Message cannot be empty".to_string()));
    }

    let max_chars = state.limits.max_chat_chars;
    if content.chars().count() > max_chars {
        return Err(CollabError::MessageTooLong { max_chars });
    }

    let user_id = conn.user_id();
    if !state.chat_limiter.check(user_id) {
        debug!("Chat from {} throttled", user_id);
        return Err(CollabError::RateLimited {
            max: state.chat_limiter.max(),
            window_ms: state.chat_limiter.window().as_millis(),
        });
    }

    if !state.membership.is_member(user_id, &message.room_id).await? {
        return Err(CollabError::Forbidden);
    }

    let record = state
        .store
        .create_chat_message(&message.room_id, user_id, content)
        .await
        .map_err(|e| {
            error!("Failed to store chat message in room {}: {}", message.room_id, e);
            e
        })?;

    state
        .transport
        .broadcast(&message.room_id, &ServerEvent::NewMessage(record.clone()), None);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memstore::MemoryStore;
    use crate::services::presence_service::join_room;
    use crate::state::testing::{connect, drain, test_state};
    use std::sync::Arc;
    use std::time::Duration;

    fn chat(room_id: &str, content: &str) -> ChatSendMessage {
        ChatSendMessage {
            room_id: room_id.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn accepted_message_reaches_everyone_including_sender() {
        let store = Arc::new(MemoryStore::open());
        let state = test_state(store.clone());
        let (alice, mut alice_rx) = connect(&state, "ca", "alice");
        let (bob, mut bob_rx) = connect(&state, "cb", "bob");
        join_room(&state, &alice, "r1").await.unwrap();
        join_room(&state, &bob, "r1").await.unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let record = send_chat(&state, &alice, chat("r1", "  hi there \n")).await.unwrap();
        assert_eq!(record.content, "hi there");
        assert_eq!(record.user_id, "alice");
        assert_eq!(store.messages(), vec![record.clone()]);

        assert_eq!(drain(&mut alice_rx), vec![ServerEvent::NewMessage(record.clone())]);
        assert_eq!(drain(&mut bob_rx), vec![ServerEvent::NewMessage(record)]);
    }

    #[tokio::test]
    async fn content_is_validated_before_anything_is_stored() {
        let store = Arc::new(MemoryStore::open());
        let state = test_state(store.clone());
        let (alice, _rx) = connect(&state, "ca", "alice");

        let err = send_chat(&state, &alice, chat("r1", "   ")).await.unwrap_err();
        assert!(matches!(err, CollabError::InvalidPayload(_)));

        // 2000 multi-byte characters is still within the limit
        let ok = "é".repeat(2000);
        assert!(send_chat(&state, &alice, chat("r1", &ok)).await.is_ok());

        let long = "a".repeat(2001);
        let err = send_chat(&state, &alice, chat("r1", &long)).await.unwrap_err();
        assert!(matches!(err, CollabError::MessageTooLong { max_chars: 2000 }));
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn non_members_cannot_chat() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone());
        let (mallory, _rx) = connect(&state, "cm", "mallory");

        let err = send_chat(&state, &mallory, chat("r1", "hello")).await.unwrap_err();
        assert!(matches!(err, CollabError::Forbidden));
        assert!(store.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_message_in_a_second_is_throttled() {
        let store = Arc::new(MemoryStore::open());
        let state = test_state(store.clone());
        let (alice, _rx) = connect(&state, "ca", "alice");

        for i in 0..5 {
            send_chat(&state, &alice, chat("r1", &format!("msg {}", i))).await.unwrap();
        }
        let err = send_chat(&state, &alice, chat("r1", "one too many")).await.unwrap_err();
        assert_eq!(err.to_string(), "Slow down. Max 5 messages per 1000ms.");
        assert_eq!(store.messages().len(), 5);

        tokio::time::advance(Duration::from_millis(1000)).await;
        send_chat(&state, &alice, chat("r1", "after the window")).await.unwrap();
        assert_eq!(store.messages().len(), 6);
    }
}
