use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::auth::auth::Identity;
use crate::error::CollabError;
use crate::models::{parse_client_event, ClientEvent, ErrorResponse, ServerEvent};
use crate::services::auth_service::get_auth_token;
use crate::services::presence_service::disconnect;
use crate::state::AppState;
use crate::websocket::msg_chat_handler::handle_chat_message;
use crate::websocket::msg_edit_handler::{handle_cursor_message, handle_edit_message};
use crate::websocket::msg_join_handler::handle_join_message;
use crate::websocket::msg_leave_handler::{handle_force_leave_message, handle_leave_message};
use crate::ws::connctx::ConnCtx;

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// WebSocket handler. The handshake is refused unless it carries a valid token.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let identity = match get_auth_token(&headers, query.token.as_deref())
        .and_then(|token| state.auth.verify(&token))
    {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Refusing WebSocket connection: {}", e);
            let status = StatusCode::UNAUTHORIZED;
            return (status, Json(ErrorResponse::from_status(status, "Authentication required"))).into_response();
        }
    };

    info!("New WebSocket connection for user {}", identity.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Handle one authenticated connection until it closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let conn = ConnCtx::new(identity);
    info!(
        "WebSocket connection established for user {} with connection_id: {}",
        conn.user_id(),
        conn.connection_id
    );

    let (mut sender, mut receiver) = socket.split();
    let outbound = state.transport.register(&conn.connection_id, conn.user_id());
    let lagged = outbound.lagged;
    let mut events = outbound.events;

    // Everything addressed to this connection goes out through this task.
    let connection_id = conn.connection_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize event for {}: {}", connection_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!("Socket for {} is gone, stopping sender", connection_id);
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Events are dispatched one at a time, in arrival order. Only the wait for
    // the next frame races the lag signal, never a dispatch.
    let mut lagged_out = false;
    loop {
        let frame = tokio::select! {
            frame = receiver.next() => frame,
            _ = lagged.notified() => {
                warn!("Closing connection {}: outbound queue overflowed", conn.connection_id);
                lagged_out = true;
                break;
            }
        };
        let Some(frame) = frame else {
            break;
        };
        match frame {
            Ok(Message::Text(text)) => dispatch_text(&state, &conn, &text).await,
            Ok(Message::Binary(_)) => {
                state.transport.send_to(
                    &conn.connection_id,
                    ServerEvent::error("unknown", "Binary frames are not supported"),
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error on {}: {}", conn.connection_id, e);
                break;
            }
        }
    }

    disconnect(&state, &conn).await;
    // A lagging peer is not worth draining to.
    if lagged_out {
        send_task.abort();
    }
    // The transport dropped our sender, so the task drains and ends.
    match send_task.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("Send task for {} aborted", conn.connection_id),
        Err(e) => error!("Send task for {} failed: {}", conn.connection_id, e),
    }
    info!("WebSocket connection {} terminated", conn.connection_id);
}

/// Parse one text frame and dispatch it. Malformed frames are answered with
/// an error to this connection only.
pub async fn dispatch_text(state: &AppState, conn: &ConnCtx, text: &str) {
    match parse_client_event(text) {
        Ok(event) => dispatch_event(state, conn, event).await,
        Err(invalid) => {
            debug!("Invalid {} event from {}: {}", invalid.event, conn.connection_id, invalid.message);
            state
                .transport
                .send_to(&conn.connection_id, ServerEvent::error(invalid.event, invalid.message));
        }
    }
}

pub async fn dispatch_event(state: &AppState, conn: &ConnCtx, event: ClientEvent) {
    let name = event.name();
    let result = match event {
        ClientEvent::Join(room_id) => handle_join_message(state, conn, &room_id).await,
        ClientEvent::Edit(edit) => handle_edit_message(state, conn, edit).await,
        ClientEvent::Cursor(cursor) => handle_cursor_message(state, conn, cursor),
        ClientEvent::Chat(message) => handle_chat_message(state, conn, message).await,
        ClientEvent::Leave(room_id) => handle_leave_message(state, conn, &room_id).await,
        ClientEvent::ForceLeave(room_id) => handle_force_leave_message(state, conn, &room_id).await,
    };

    if let Err(e) = result {
        report_error(state, conn, name, &e);
    }
}

fn report_error(state: &AppState, conn: &ConnCtx, event: &str, err: &CollabError) {
    match err {
        CollabError::Persistence(_) => error!("{} from {} failed: {}", event, conn.user_id(), err),
        _ => debug!("{} from {} rejected: {}", event, conn.user_id(), err),
    }
    state
        .transport
        .send_to(&conn.connection_id, ServerEvent::error(event, err.client_message(event)));
}
