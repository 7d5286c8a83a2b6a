pub mod dbroom;
pub mod memstore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{ChatRecord, DocumentSnapshot};

/// Durable home of room documents and chat history.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Latest persisted snapshot, or `None` when the room has never been saved.
    async fn load_document(&self, room_id: &str) -> Result<Option<DocumentSnapshot>, StoreError>;

    async fn save_document(&self, room_id: &str, content: &str, version: u64) -> Result<(), StoreError>;

    async fn create_chat_message(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<ChatRecord, StoreError>;
}

/// Answers whether a user may access a room.
#[async_trait]
pub trait MembershipChecker: Send + Sync {
    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool, StoreError>;

    /// Drop anything remembered about this pair. Only caching checkers care.
    async fn forget(&self, _user_id: &str, _room_id: &str) {}
}
