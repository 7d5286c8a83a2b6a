use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::{DurableStore, MembershipChecker};
use crate::error::StoreError;
use crate::models::{ChatRecord, DocumentSnapshot};

/// One write received by [`MemoryStore::save_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    pub room_id: String,
    pub content: String,
    pub version: u64,
}

/// Process-local store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<String, DocumentSnapshot>,
    saves: Mutex<Vec<SavedDocument>>,
    messages: Mutex<Vec<ChatRecord>>,
    loads: AtomicUsize,
    fail_saves: AtomicBool,
    open_membership: bool,
    members: DashSet<(String, String)>,
}

impl MemoryStore {
    /// Store where only explicitly granted users are room members.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store where every authenticated user is a member of every room.
    pub fn open() -> Self {
        Self {
            open_membership: true,
            ..Self::default()
        }
    }

    pub fn grant(&self, user_id: &str, room_id: &str) {
        self.members.insert((user_id.to_string(), room_id.to_string()));
    }

    pub fn revoke(&self, user_id: &str, room_id: &str) {
        self.members.remove(&(user_id.to_string(), room_id.to_string()));
    }

    pub fn seed(&self, room_id: &str, content: &str, version: u64) {
        self.documents.insert(
            room_id.to_string(),
            DocumentSnapshot {
                content: content.to_string(),
                version,
            },
        );
    }

    /// Make every following save fail until switched back.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> Vec<SavedDocument> {
        self.saves.lock().clone()
    }

    pub fn saves_for(&self, room_id: &str) -> Vec<SavedDocument> {
        self.saves
            .lock()
            .iter()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<ChatRecord> {
        self.messages.lock().clone()
    }

    pub fn document(&self, room_id: &str) -> Option<DocumentSnapshot> {
        self.documents.get(room_id).map(|d| d.value().clone())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load_document(&self, room_id: &str) -> Result<Option<DocumentSnapshot>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.document(room_id))
    }

    async fn save_document(&self, room_id: &str, content: &str, version: u64) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store refused the write".to_string()));
        }
        debug!("Memory store saving room {} at version {}", room_id, version);
        self.seed(room_id, content, version);
        self.saves.lock().push(SavedDocument {
            room_id: room_id.to_string(),
            content: content.to_string(),
            version,
        });
        Ok(())
    }

    async fn create_chat_message(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<ChatRecord, StoreError> {
        let record = ChatRecord {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            user: None,
        };
        self.messages.lock().push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl MembershipChecker for MemoryStore {
    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool, StoreError> {
        Ok(self.open_membership
            || self.members.contains(&(user_id.to_string(), room_id.to_string())))
    }
}
