use tracing::{debug, info, warn};

use crate::error::CollabError;
use crate::models::{JoinedMessage, KickedMessage, PresenceMessage, ServerEvent};
use crate::state::AppState;
use crate::ws::connctx::ConnCtx;

/// Add the connection's user to the room and hand it the current document.
///
/// The joined reply and the subscription both happen under the room lock, so
/// the joiner sees every edit applied after the state it was given.
pub async fn join_room(state: &AppState, conn: &ConnCtx, room_id: &str) -> Result<JoinedMessage, CollabError> {
    let user_id = conn.user_id();
    if !state.membership.is_member(user_id, room_id).await? {
        info!("User {} is not a member of room {}", user_id, room_id);
        return Err(CollabError::Forbidden);
    }

    let mut lease = state.registry.get_or_create(room_id).await?;
    if let Some(previous) = lease.upsert_participant(user_id, &conn.connection_id) {
        if previous != conn.connection_id {
            // The replaced connection no longer speaks for the user here.
            debug!(
                "User {} rejoined room {} on {}, replacing {}",
                user_id, room_id, conn.connection_id, previous
            );
            state.transport.unsubscribe(room_id, &previous);
            state.transport.send_to(
                &previous,
                ServerEvent::Kicked(KickedMessage {
                    room_id: room_id.to_string(),
                }),
            );
        }
    }
    state.transport.subscribe(room_id, &conn.connection_id);

    let participants = lease.participant_list();
    let joined = JoinedMessage {
        room_id: room_id.to_string(),
        document: lease.document().to_string(),
        version: lease.version(),
        participants: participants.clone(),
    };
    state
        .transport
        .send_to(&conn.connection_id, ServerEvent::Joined(joined.clone()));
    state.transport.broadcast(
        room_id,
        &ServerEvent::Presence(PresenceMessage { participants }),
        Some(&conn.connection_id),
    );

    info!(
        "User {} joined room {} at version {} ({} participants)",
        user_id,
        room_id,
        lease.version(),
        lease.participant_count()
    );
    Ok(joined)
}

/// Drop `user_id` from the room if `connection_id` is still its registered
/// connection. The last participant out flushes and unloads the room.
///
/// Returns true when a participant entry was removed.
pub async fn leave_room(state: &AppState, user_id: &str, connection_id: &str, room_id: &str) -> bool {
    state.transport.unsubscribe(room_id, connection_id);

    let Some(mut lease) = state.registry.acquire(room_id).await else {
        debug!("Leave for room {} which is not resident", room_id);
        return false;
    };

    if !lease.remove_participant_on(user_id, connection_id) {
        debug!(
            "Connection {} of user {} is not the registered one in room {}",
            connection_id, user_id, room_id
        );
        return false;
    }

    info!("User {} left room {}", user_id, room_id);
    if lease.participant_count() == 0 {
        state.registry.evict(lease).await;
    } else {
        let presence = ServerEvent::Presence(PresenceMessage {
            participants: lease.participant_list(),
        });
        state.transport.broadcast(room_id, &presence, None);
    }
    true
}

/// Server-initiated removal of this connection from a room.
pub async fn force_leave(state: &AppState, conn: &ConnCtx, room_id: &str) {
    leave_room(state, conn.user_id(), &conn.connection_id, room_id).await;
    state.transport.send_to(
        &conn.connection_id,
        ServerEvent::Kicked(KickedMessage {
            room_id: room_id.to_string(),
        }),
    );
}

/// Remove a user from a room on behalf of an administrator. Returns false
/// when the user has no presence there.
pub async fn kick(state: &AppState, room_id: &str, user_id: &str) -> bool {
    state.membership.forget(user_id, room_id).await;

    let connection_id = match state.registry.acquire(room_id).await {
        Some(lease) => lease.participant_connection(user_id).map(str::to_string),
        None => None,
    };
    let Some(connection_id) = connection_id else {
        debug!("Kick for user {} who is not in room {}", user_id, room_id);
        return false;
    };

    leave_room(state, user_id, &connection_id, room_id).await;
    state.transport.send_to(
        &connection_id,
        ServerEvent::Kicked(KickedMessage {
            room_id: room_id.to_string(),
        }),
    );
    warn!("User {} was kicked from room {}", user_id, room_id);
    true
}

/// Leave every room the connection joined, then forget the connection.
pub async fn disconnect(state: &AppState, conn: &ConnCtx) {
    let rooms = state.transport.rooms_of(&conn.connection_id);
    debug!(
        "Connection {} of user {} closed with {} rooms joined",
        conn.connection_id,
        conn.user_id(),
        rooms.len()
    );
    for room_id in rooms {
        leave_room(state, conn.user_id(), &conn.connection_id, &room_id).await;
    }
    state.transport.unregister(&conn.connection_id);
}
