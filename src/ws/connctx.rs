use uuid::Uuid;

use crate::auth::auth::Identity;

/// Per-connection context, created once the handshake is authenticated.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub connection_id: String,
    pub identity: Identity,
}

impl ConnCtx {
    pub fn new(identity: Identity) -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string(),
            identity,
        }
    }

    pub fn with_id(connection_id: impl Into<String>, identity: Identity) -> Self {
        Self {
            connection_id: connection_id.into(),
            identity,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }
}
