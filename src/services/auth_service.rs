use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::debug;

use crate::auth::auth::Identity;
use crate::error::AuthError;

/// Validates a bearer credential and returns who it belongs to.
pub trait AuthVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// HS256 JWT verifier.
pub struct JwtVerifier {
    secret: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl AuthVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let token_data = validate_jwt(credential, secret)?;
        let claims = &token_data.claims;

        let user_id = claims
            .get("userId")
            .or_else(|| claims.get("sub"))
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingSubject)?
            .to_string();

        let email = claims
            .get("email")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let roles = match claims.get("roles").and_then(|v| v.as_array()) {
            Some(roles_array) => roles_array
                .iter()
                .filter_map(|r| r.as_str().map(|s| s.to_string()))
                .collect::<Vec<String>>(),
            None => Vec::new(),
        };

        debug!("JWT token validated successfully for user: {}", user_id);
        Ok(Identity { user_id, email, roles })
    }
}

/// Get the auth token from a handshake: the `token` query parameter, then the
/// Authorization header, then the `auth_token` cookie.
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, AuthError> {
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| AuthError::MissingToken)?;
        let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        return Ok(token.to_string());
    }

    let cookie_header = headers
        .get(http::header::COOKIE)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MissingToken)?;

    for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
        if cookie.name() == "auth_token" {
            return Ok(cookie.value().to_string());
        }
    }
    Err(AuthError::MissingToken)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    pub fn issue_token(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    pub fn user_token(secret: &str, user_id: &str) -> String {
        let exp = chrono::Utc::now().timestamp() + 3600;
        issue_token(secret, json!({ "sub": user_id, "exp": exp }))
    }

    #[test]
    fn verifies_subject_email_and_roles() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = issue_token(
            "s3cret",
            json!({ "userId": "u1", "email": "u1@example.com", "roles": ["admin"], "exp": exp }),
        );
        let identity = JwtVerifier::new(Some("s3cret".into())).verify(&token).unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.email.as_deref(), Some("u1@example.com"));
        assert_eq!(identity.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let verifier = JwtVerifier::new(Some("s3cret".into()));
        assert!(matches!(
            verifier.verify(&user_token("other", "u1")),
            Err(AuthError::InvalidToken(_))
        ));

        let expired = issue_token("s3cret", json!({ "sub": "u1", "exp": 1_000 }));
        assert!(verifier.verify(&expired).is_err());
    }

    #[test]
    fn rejects_tokens_without_user() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = issue_token("s3cret", json!({ "exp": exp }));
        let verifier = JwtVerifier::new(Some("s3cret".into()));
        assert!(matches!(verifier.verify(&token), Err(AuthError::MissingSubject)));
    }

    #[test]
    fn missing_secret_refuses_everything() {
        let verifier = JwtVerifier::new(None);
        assert!(matches!(
            verifier.verify(&user_token("s3cret", "u1")),
            Err(AuthError::NotConfigured)
        ));
    }

    #[test]
    fn token_sources_in_order() {
        let mut headers = HeaderMap::new();
        assert!(matches!(get_auth_token(&headers, None), Err(AuthError::MissingToken)));

        headers.insert(http::header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=from-cookie"));
        assert_eq!(get_auth_token(&headers, None).unwrap(), "from-cookie");

        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(get_auth_token(&headers, None).unwrap(), "from-header");

        assert_eq!(get_auth_token(&headers, Some("from-query")).unwrap(), "from-query");
        assert_eq!(get_auth_token(&headers, Some("  ")).unwrap(), "from-header");
    }
}
