use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use crate::models::ServerEvent;

struct ConnectionEntry {
    user_id: String,
    /// None once the connection fell behind and was cut off.
    sender: Option<mpsc::Sender<ServerEvent>>,
    lagged: Arc<Notify>,
    rooms: HashSet<String>,
}

/// What the socket task needs to serve one registered connection.
pub struct Outbound {
    pub events: mpsc::Receiver<ServerEvent>,
    /// Fires once if the connection's queue overflowed on an event that
    /// cannot be skipped. The socket should be closed.
    pub lagged: Arc<Notify>,
}

/// Delivers server events to single connections and to every connection
/// subscribed to a room.
///
/// Each connection has a bounded queue. Cursor updates are dropped when it is
/// full; any other event closes the connection instead.
///
/// The two maps are never locked at the same time.
pub struct ConnectionTransport {
    connections: DashMap<String, ConnectionEntry>,
    rooms: DashMap<String, HashSet<String>>,
    queue_capacity: usize,
}

impl ConnectionTransport {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a connection and get the stream of events addressed to it.
    pub fn register(&self, connection_id: &str, user_id: &str) -> Outbound {
        let (sender, events) = mpsc::channel(self.queue_capacity);
        let lagged = Arc::new(Notify::new());
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                user_id: user_id.to_string(),
                sender: Some(sender),
                lagged: lagged.clone(),
                rooms: HashSet::new(),
            },
        );
        Outbound { events, lagged }
    }

    /// Forget a connection, dropping any subscriptions it still had.
    pub fn unregister(&self, connection_id: &str) {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return;
        };
        debug!(
            "Connection {} of user {} unregistered with {} subscriptions",
            connection_id,
            entry.user_id,
            entry.rooms.len()
        );
        for room_id in entry.rooms {
            self.drop_from_room(&room_id, connection_id);
        }
    }

    pub fn subscribe(&self, room_id: &str, connection_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.rooms.insert(room_id.to_string());
        }
    }

    pub fn unsubscribe(&self, room_id: &str, connection_id: &str) {
        self.drop_from_room(room_id, connection_id);
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.rooms.remove(room_id);
        }
    }

    fn drop_from_room(&self, room_id: &str, connection_id: &str) {
        if let Some(mut subscribers) = self.rooms.get_mut(room_id) {
            subscribers.remove(connection_id);
        }
        self.rooms.remove_if(room_id, |_, subscribers| subscribers.is_empty());
    }

    pub fn is_subscribed(&self, room_id: &str, connection_id: &str) -> bool {
        self.connections
            .get(connection_id)
            .map(|entry| entry.rooms.contains(room_id))
            .unwrap_or(false)
    }

    /// Rooms the connection is currently subscribed to.
    pub fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn send_to(&self, connection_id: &str, event: ServerEvent) -> bool {
        let outcome = match self.connections.get(connection_id) {
            Some(entry) => match &entry.sender {
                Some(sender) => sender.try_send(event),
                None => return false,
            },
            None => {
                debug!("Dropping event for unknown connection {}", connection_id);
                return false;
            }
        };

        match outcome {
            Ok(()) => true,
            Err(TrySendError::Full(ServerEvent::CursorUpdate(_))) => {
                debug!("Queue of connection {} is full, dropping cursor update", connection_id);
                false
            }
            Err(TrySendError::Full(_)) => {
                self.close_lagging(connection_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Stop queueing for a connection that cannot keep up and tell its socket
    /// task to hang up.
    fn close_lagging(&self, connection_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            if entry.sender.take().is_some() {
                warn!(
                    "Connection {} of user {} is lagging behind, closing it",
                    connection_id, entry.user_id
                );
                entry.lagged.notify_one();
            }
        }
    }

    /// Send to every subscriber of the room except `except`. Returns the
    /// number of connections reached.
    pub fn broadcast(&self, room_id: &str, event: &ServerEvent, except: Option<&str>) -> usize {
        let targets: Vec<String> = match self.rooms.get(room_id) {
            Some(subscribers) => subscribers
                .iter()
                .filter(|conn| Some(conn.as_str()) != except)
                .cloned()
                .collect(),
            None => return 0,
        };

        targets
            .iter()
            .filter(|conn| self.send_to(conn, event.clone()))
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kicked(room_id: &str) -> ServerEvent {
        ServerEvent::Kicked(crate::models::KickedMessage {
            room_id: room_id.to_string(),
        })
    }

    #[test]
    fn broadcast_skips_the_sender_and_other_rooms() {
        let transport = ConnectionTransport::new(8);
        let mut a = transport.register("a", "alice").events;
        let mut b = transport.register("b", "bob").events;
        let mut c = transport.register("c", "carol").events;
        transport.subscribe("r1", "a");
        transport.subscribe("r1", "b");
        transport.subscribe("r2", "c");

        assert_eq!(transport.broadcast("r1", &kicked("r1"), Some("a")), 1);
        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().unwrap(), kicked("r1"));
        assert!(c.try_recv().is_err());

        assert_eq!(transport.broadcast("r1", &kicked("r1"), None), 2);
    }

    #[test]
    fn unregister_drops_every_subscription() {
        let transport = ConnectionTransport::new(8);
        let _a = transport.register("a", "alice");
        transport.subscribe("r1", "a");
        transport.subscribe("r2", "a");

        let mut rooms = transport.rooms_of("a");
        rooms.sort();
        assert_eq!(rooms, vec!["r1".to_string(), "r2".to_string()]);

        transport.unregister("a");
        assert_eq!(transport.broadcast("r1", &kicked("r1"), None), 0);
        assert_eq!(transport.connection_count(), 0);
        assert!(!transport.is_subscribed("r1", "a"));
    }

    #[test]
    fn unsubscribe_keeps_other_rooms() {
        let transport = ConnectionTransport::new(8);
        let _a = transport.register("a", "alice");
        transport.subscribe("r1", "a");
        transport.subscribe("r2", "a");
        transport.unsubscribe("r1", "a");

        assert!(!transport.is_subscribed("r1", "a"));
        assert!(transport.is_subscribed("r2", "a"));
    }

    fn cursor(user_id: &str) -> ServerEvent {
        ServerEvent::CursorUpdate(crate::models::CursorUpdateMessage {
            user_id: user_id.to_string(),
            cursor: crate::models::Cursor { line: 0, ch: 0 },
        })
    }

    #[tokio::test]
    async fn full_queue_drops_cursors_and_closes_on_authoritative_events() {
        let transport = ConnectionTransport::new(2);
        let mut slow = transport.register("slow", "alice");
        let mut fast = transport.register("fast", "bob").events;
        transport.subscribe("r1", "slow");
        transport.subscribe("r1", "fast");

        assert_eq!(transport.broadcast("r1", &kicked("r1"), None), 2);
        assert_eq!(transport.broadcast("r1", &kicked("r1"), None), 2);
        assert_eq!(fast.try_recv().unwrap(), kicked("r1"));
        assert_eq!(fast.try_recv().unwrap(), kicked("r1"));

        // a full queue sheds cursor updates and keeps the connection
        assert_eq!(transport.broadcast("r1", &cursor("carol"), None), 1);
        assert!(transport.send_to("fast", kicked("r1")));
        assert!(transport.is_subscribed("r1", "slow"));

        // any other event that cannot be queued cuts the connection off
        assert!(!transport.send_to("slow", kicked("r1")));
        tokio::time::timeout(std::time::Duration::from_secs(1), slow.lagged.notified())
            .await
            .expect("lagging connection is signalled");
        assert!(!transport.send_to("slow", cursor("carol")));

        // what was queued before the cut still drains, then the stream ends
        assert_eq!(slow.events.recv().await, Some(kicked("r1")));
        assert_eq!(slow.events.recv().await, Some(kicked("r1")));
        assert_eq!(slow.events.recv().await, None);
    }
}
