use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ChatRecord, Cursor, Participant};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub room_id: String,
    pub patch: String,
    pub version: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMessage {
    pub room_id: String,
    pub cursor: Cursor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendMessage {
    pub room_id: String,
    pub content: String,
}

/// Events a client may send. Join, leave and force-leave carry the bare room id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join(String),
    Edit(EditMessage),
    Cursor(CursorMessage),
    Chat(ChatSendMessage),
    Leave(String),
    ForceLeave(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => "join",
            ClientEvent::Edit(_) => "edit",
            ClientEvent::Cursor(_) => "cursor",
            ClientEvent::Chat(_) => "chat",
            ClientEvent::Leave(_) => "leave",
            ClientEvent::ForceLeave(_) => "force-leave",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            ClientEvent::Join(room_id)
            | ClientEvent::Leave(room_id)
            | ClientEvent::ForceLeave(room_id) => room_id,
            ClientEvent::Edit(msg) => &msg.room_id,
            ClientEvent::Cursor(msg) => &msg.room_id,
            ClientEvent::Chat(msg) => &msg.room_id,
        }
    }
}

/// A frame that could not be turned into a [`ClientEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidEvent {
    pub event: String,
    pub message: String,
}

/// Parse and shape-check one inbound text frame.
pub fn parse_client_event(text: &str) -> Result<ClientEvent, InvalidEvent> {
    let value: Value = serde_json::from_str(text).map_err(|e| InvalidEvent {
        event: "unknown".to_string(),
        message: format!("Malformed message: {}", e),
    })?;

    let event_name = value
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let event: ClientEvent = serde_json::from_value(value).map_err(|e| InvalidEvent {
        event: event_name.clone(),
        message: format!("Invalid {} payload: {}", event_name, e),
    })?;

    if event.room_id().trim().is_empty() {
        return Err(InvalidEvent {
            event: event_name,
            message: "Missing roomId".to_string(),
        });
    }

    Ok(event)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedMessage {
    pub room_id: String,
    pub document: String,
    pub version: u64,
    pub participants: Vec<Participant>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub participants: Vec<Participant>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditAppliedMessage {
    pub room_id: String,
    pub patch: String,
    pub version: u64,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResyncMessage {
    pub room_id: String,
    pub document: String,
    pub version: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdateMessage {
    pub user_id: String,
    pub cursor: Cursor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KickedMessage {
    pub room_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub event: String,
    pub message: String,
}

/// Events the server pushes to connections.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Joined(JoinedMessage),
    Presence(PresenceMessage),
    Edit(EditAppliedMessage),
    Resync(ResyncMessage),
    CursorUpdate(CursorUpdateMessage),
    NewMessage(ChatRecord),
    Kicked(KickedMessage),
    Error(ErrorMessage),
}

impl ServerEvent {
    pub fn error(event: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorMessage {
            event: event.into(),
            message: message.into(),
        })
    }
}
