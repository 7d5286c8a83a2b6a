use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::models::ErrorResponse;

const ADMIN_ROLE: &str = "admin";

/// Authenticated caller, as established by the auth verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            roles: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }
}

pub fn is_admin(identity: &Identity) -> bool {
    identity.roles.iter().any(|r| r == ADMIN_ROLE)
}

pub fn ensure_admin(identity: &Identity) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(identity) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse::from_status(status, "Admin access required"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_role_passes() {
        assert!(ensure_admin(&Identity::new("u1").with_roles(&["admin"])).is_ok());

        let (status, body) = ensure_admin(&Identity::new("u1").with_roles(&["editor"])).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.0.code, 403);
    }
}
