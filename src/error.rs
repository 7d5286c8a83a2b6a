use thiserror::Error;

/// Failure talking to the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure authenticating a connection handshake or an API request.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,
    #[error("Invalid or expired token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("Token does not carry a user id")]
    MissingSubject,
    #[error("No JWT secret configured")]
    NotConfigured,
}

/// Per-event failures. Each one is reported to the originating connection only.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("{0}")]
    InvalidPayload(String),
    #[error("Not a participant in this room")]
    NotParticipant,
    #[error("Room not loaded. Join the room first.")]
    RoomNotLoaded,
    #[error("Not a member of this room")]
    Forbidden,
    #[error("Patch too large (max {}KB)", .max_bytes / 1024)]
    PatchTooLarge { max_bytes: usize },
    #[error("Message too long (max {max_chars} characters)")]
    MessageTooLong { max_chars: usize },
    #[error("Slow down. Max {max} messages per {window_ms}ms.")]
    RateLimited { max: u32, window_ms: u128 },
    #[error("storage failure: {0}")]
    Persistence(#[from] StoreError),
}

impl CollabError {
    /// Message sent back over the wire. Storage details stay in the logs.
    pub fn client_message(&self, event: &str) -> String {
        match self {
            CollabError::Persistence(_) => match event {
                "join" => "Failed to join room".to_string(),
                "chat" => "Failed to send message".to_string(),
                "edit" => "Failed to apply edit".to_string(),
                _ => "Internal error".to_string(),
            },
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_detail_is_not_leaked_to_clients() {
        let err = CollabError::Persistence(StoreError::Unavailable("pool timed out".into()));
        assert_eq!(err.client_message("join"), "Failed to join room");
        assert_eq!(err.client_message("chat"), "Failed to send message");
        assert!(!err.client_message("leave").contains("pool"));
    }

    #[test]
    fn limit_errors_name_the_limit() {
        let err = CollabError::PatchTooLarge { max_bytes: 50 * 1024 };
        assert_eq!(err.client_message("edit"), "Patch too large (max 50KB)");
        let err = CollabError::MessageTooLong { max_chars: 2000 };
        assert_eq!(err.to_string(), "Message too long (max 2000 characters)");
    }
}
