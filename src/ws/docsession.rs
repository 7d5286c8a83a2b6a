use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::timer::TimerHandle;
use crate::models::{DocumentSnapshot, Participant};

/// Live state of one room being edited.
///
/// Only reachable through a [`SessionLease`], which holds the room's lock for
/// as long as it lives. Every read-check-mutate sequence on a room therefore
/// happens under one lease.
#[derive(Debug)]
pub struct RoomSession {
    room_id: String,
    document: String,
    version: u64,
    /// user id -> connection id, last join wins
    participants: BTreeMap<String, String>,
    pending_flush: Option<TimerHandle>,
    flush_generation: u64,
    resident: bool,
    /// Serializes store writes for this room and remembers the last version written.
    write_gate: Arc<Mutex<Option<u64>>>,
}

impl RoomSession {
    pub(super) fn unloaded(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            document: String::new(),
            version: 0,
            participants: BTreeMap::new(),
            pending_flush: None,
            flush_generation: 0,
            resident: false,
            write_gate: Arc::new(Mutex::new(None)),
        }
    }

    pub(super) fn hydrate(&mut self, snapshot: Option<DocumentSnapshot>) {
        if let Some(snapshot) = snapshot {
            self.document = snapshot.content;
            self.version = snapshot.version;
            self.write_gate = Arc::new(Mutex::new(Some(snapshot.version)));
        }
        self.resident = true;
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the document and bump the version by one. Returns the new version.
    pub fn apply_patch(&mut self, patch: String) -> u64 {
        self.document = patch;
        self.version += 1;
        self.version
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            content: self.document.clone(),
            version: self.version,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.resident
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.contains_key(user_id)
    }

    pub fn participant_connection(&self, user_id: &str) -> Option<&str> {
        self.participants.get(user_id).map(String::as_str)
    }

    /// Insert or overwrite the user's presence. Returns the connection it replaced.
    pub fn upsert_participant(&mut self, user_id: &str, connection_id: &str) -> Option<String> {
        self.participants
            .insert(user_id.to_string(), connection_id.to_string())
    }

    /// Remove the user only while `connection_id` is still the one registered for them.
    pub fn remove_participant_on(&mut self, user_id: &str, connection_id: &str) -> bool {
        if self.participant_connection(user_id) == Some(connection_id) {
            self.participants.remove(user_id);
            true
        } else {
            false
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn participant_list(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .map(|(user_id, connection_id)| Participant {
                user_id: user_id.clone(),
                connection_id: connection_id.clone(),
            })
            .collect()
    }

    pub fn has_pending_flush(&self) -> bool {
        self.pending_flush.is_some()
    }

    pub(super) fn cancel_pending_flush(&mut self) {
        if let Some(handle) = self.pending_flush.take() {
            handle.cancel();
        }
    }

    /// Cancel whatever is pending and return the generation the next timer must carry.
    pub(super) fn next_flush_generation(&mut self) -> u64 {
        self.cancel_pending_flush();
        self.flush_generation += 1;
        self.flush_generation
    }

    pub(super) fn arm_flush(&mut self, handle: TimerHandle) {
        self.pending_flush = Some(handle);
    }

    /// Called by a firing timer. Returns false when the timer has been superseded.
    pub(super) fn claim_flush(&mut self, generation: u64) -> bool {
        if !self.resident || self.flush_generation != generation {
            return false;
        }
        // The task is already running; dropping the handle must not abort it.
        self.pending_flush = None;
        true
    }

    pub(super) fn write_gate(&self) -> Arc<Mutex<Option<u64>>> {
        self.write_gate.clone()
    }

    pub(super) fn retire(&mut self) {
        self.cancel_pending_flush();
        self.resident = false;
    }
}

/// Exclusive, short-lived access to one [`RoomSession`].
pub struct SessionLease {
    handle: Arc<Mutex<RoomSession>>,
    guard: OwnedMutexGuard<RoomSession>,
}

impl SessionLease {
    pub(super) async fn lock(handle: Arc<Mutex<RoomSession>>) -> Self {
        let guard = handle.clone().lock_owned().await;
        Self { handle, guard }
    }

    pub(super) fn handle(&self) -> &Arc<Mutex<RoomSession>> {
        &self.handle
    }
}

impl Deref for SessionLease {
    type Target = RoomSession;

    fn deref(&self) -> &RoomSession {
        &self.guard
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut RoomSession {
        &mut self.guard
    }
}
