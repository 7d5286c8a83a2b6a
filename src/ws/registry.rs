use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::docsession::{RoomSession, SessionLease};
use super::persist::PersistScheduler;
use super::timer::DelayTimer;
use crate::db::DurableStore;
use crate::error::StoreError;

/// Counters reported by the diagnostics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub participants: usize,
    pub dirty_rooms: usize,
}

/// Owns every resident [`RoomSession`].
///
/// Each room sits behind its own lock. A room is present here while it has
/// participants or while its first joiner is loading it; it is flushed and
/// removed the moment its last participant leaves.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<RoomSession>>>,
    store: Arc<dyn DurableStore>,
    scheduler: PersistScheduler,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DurableStore>, timer: Arc<dyn DelayTimer>, debounce: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            scheduler: PersistScheduler::new(store.clone(), timer, debounce),
            store,
        }
    }

    /// Lease the resident session for `room_id`, loading it from the store
    /// (or starting an empty document at version 0) when none is resident.
    pub async fn get_or_create(&self, room_id: &str) -> Result<SessionLease, StoreError> {
        loop {
            let existing = self.sessions.get(room_id).map(|entry| entry.value().clone());
            if let Some(handle) = existing {
                let lease = SessionLease::lock(handle).await;
                if lease.is_resident() {
                    return Ok(lease);
                }
                // Evicted or failed to load while we waited; the entry is gone by now.
                continue;
            }

            // Lock before publishing so later callers wait for the load.
            let handle = Arc::new(Mutex::new(RoomSession::unloaded(room_id)));
            let mut lease = SessionLease::lock(handle.clone()).await;
            match self.sessions.entry(room_id.to_string()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(handle.clone());
                }
            }

            match self.store.load_document(room_id).await {
                Ok(snapshot) => {
                    match &snapshot {
                        Some(s) => info!("Loaded room {} at version {}", room_id, s.version),
                        None => info!("Room {} has no stored document, starting empty", room_id),
                    }
                    lease.hydrate(snapshot);
                    return Ok(lease);
                }
                Err(e) => {
                    error!("Failed to load document for room {}: {}", room_id, e);
                    self.sessions
                        .remove_if(room_id, |_, current| Arc::ptr_eq(current, &handle));
                    return Err(e);
                }
            }
        }
    }

    /// Lease the session only if it is already resident.
    pub async fn acquire(&self, room_id: &str) -> Option<SessionLease> {
        let handle = self.sessions.get(room_id).map(|entry| entry.value().clone())?;
        let lease = SessionLease::lock(handle).await;
        lease.is_resident().then_some(lease)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.sessions.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Re-arm the debounced flush for the leased room.
    pub fn schedule_persist(&self, lease: &mut SessionLease) {
        self.scheduler.schedule(lease);
    }

    /// Flush a resident room right away. Returns false when the room is not
    /// resident or the write failed.
    pub async fn persist_room(&self, room_id: &str) -> bool {
        match self.acquire(room_id).await {
            Some(lease) => self.scheduler.persist(lease).await,
            None => false,
        }
    }

    /// Flush the session and drop it from the registry. The lease is held
    /// throughout, so a concurrent joiner reloads the flushed state.
    pub async fn evict(&self, mut lease: SessionLease) {
        let room_id = lease.room_id().to_string();
        if !self.scheduler.persist_locked(&mut lease).await {
            warn!(
                "Evicting room {} at version {} without a successful flush",
                room_id,
                lease.version()
            );
        }
        lease.retire();
        let handle = lease.handle().clone();
        self.sessions
            .remove_if(&room_id, |_, current| Arc::ptr_eq(current, &handle));
        info!("Room {} emptied, persisted and unloaded", room_id);
    }

    /// Flush every resident room. Used at shutdown.
    pub async fn flush_all(&self) -> usize {
        let room_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut flushed = 0;
        for room_id in room_ids {
            if self.persist_room(&room_id).await {
                flushed += 1;
            }
        }
        debug!("Flushed {} rooms", flushed);
        flushed
    }

    pub async fn stats(&self) -> RegistryStats {
        let handles: Vec<Arc<Mutex<RoomSession>>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut stats = RegistryStats::default();
        for handle in handles {
            let session = handle.lock().await;
            if !session.is_resident() {
                continue;
            }
            stats.rooms += 1;
            stats.participants += session.participant_count();
            if session.has_pending_flush() {
                stats.dirty_rooms += 1;
            }
        }
        stats
    }
}
