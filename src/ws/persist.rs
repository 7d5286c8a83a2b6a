//! Debounced write-back of room documents.
//!
//! Every accepted edit re-arms a single-shot timer for its room. When the
//! timer fires, whatever the room holds at that moment is written, so a burst
//! of edits inside one delay window collapses into one write. Writes for a
//! room go through the room's write gate, which keeps them ordered and drops
//! a snapshot that is older than one already written.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::docsession::{RoomSession, SessionLease};
use super::timer::DelayTimer;
use crate::db::DurableStore;
use crate::models::DocumentSnapshot;

pub struct PersistScheduler {
    store: Arc<dyn DurableStore>,
    timer: Arc<dyn DelayTimer>,
    delay: Duration,
}

impl PersistScheduler {
    pub fn new(store: Arc<dyn DurableStore>, timer: Arc<dyn DelayTimer>, delay: Duration) -> Self {
        Self { store, timer, delay }
    }

    /// Cancel the room's pending flush, if any, and arm a new one.
    pub fn schedule(&self, lease: &mut SessionLease) {
        let generation = lease.next_flush_generation();
        let handle = lease.handle().clone();
        let store = self.store.clone();

        let task = Box::pin(async move {
            let (room_id, snapshot, gate) = {
                let mut session = handle.lock().await;
                if !session.claim_flush(generation) {
                    return;
                }
                (
                    session.room_id().to_string(),
                    session.snapshot(),
                    session.write_gate(),
                )
            };
            write_snapshot(store.as_ref(), &room_id, snapshot, &gate).await;
        });

        let timer = self.timer.schedule(self.delay, task);
        lease.arm_flush(timer);
        debug!("Flush for room {} armed (generation {})", lease.room_id(), generation);
    }

    /// Flush now, cancelling any pending timer. The room lock is released
    /// before the store is written.
    pub async fn persist(&self, mut lease: SessionLease) -> bool {
        lease.cancel_pending_flush();
        let room_id = lease.room_id().to_string();
        let snapshot = lease.snapshot();
        let gate = lease.write_gate();
        drop(lease);
        write_snapshot(self.store.as_ref(), &room_id, snapshot, &gate).await
    }

    /// Flush while keeping the room locked. Used on eviction so nobody can
    /// reload the room before its final state is durable.
    pub async fn persist_locked(&self, session: &mut RoomSession) -> bool {
        session.cancel_pending_flush();
        let room_id = session.room_id().to_string();
        let snapshot = session.snapshot();
        let gate = session.write_gate();
        write_snapshot(self.store.as_ref(), &room_id, snapshot, &gate).await
    }
}

/// Write one snapshot. Failures are logged and swallowed; in-memory state
/// stays authoritative and the next armed flush tries again.
async fn write_snapshot(
    store: &dyn DurableStore,
    room_id: &str,
    snapshot: DocumentSnapshot,
    gate: &Mutex<Option<u64>>,
) -> bool {
    let mut last_written = gate.lock().await;
    if matches!(*last_written, Some(written) if written > snapshot.version) {
        debug!(
            "Skipping stale write of room {} at version {} (already at {:?})",
            room_id, snapshot.version, *last_written
        );
        return true;
    }

    match store
        .save_document(room_id, &snapshot.content, snapshot.version)
        .await
    {
        Ok(()) => {
            *last_written = Some(snapshot.version);
            info!("Persisted room {} at version {}", room_id, snapshot.version);
            true
        }
        Err(e) => {
            error!(
                "Failed to persist document for room {} at version {}: {}",
                room_id, snapshot.version, e
            );
            false
        }
    }
}
