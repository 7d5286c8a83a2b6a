pub mod api;
pub mod auth_middleware;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::{AllowOrigin, CorsLayer}, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::state::AppState;
use crate::websocket::websocket_handler;

pub use api::create_api_routes;

/// The whole HTTP surface: the collaboration socket, the API and the docs.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state.clone())
        .nest("/api", create_api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origin_list()))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memstore::MemoryStore;
    use crate::models::{KickResponse, KickedMessage, ServerEvent};
    use crate::services::auth_service::tests::{issue_token, user_token};
    use crate::services::presence_service::join_room;
    use crate::state::testing::{connect, drain, test_state, TEST_SECRET};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn admin_token() -> String {
        let exp = chrono::Utc::now().timestamp() + 3600;
        issue_token(TEST_SECRET, json!({ "sub": "root", "roles": ["admin"], "exp": exp }))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_and_ready_need_no_token() {
        let app = create_app(test_state(Arc::new(MemoryStore::open())));

        let response = app.clone().oneshot(request(Method::GET, "/api/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = app.oneshot(request(Method::GET, "/api/ready", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn diagnostics_requires_an_admin() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let (alice, _rx) = connect(&state, "ca", "alice");
        join_room(&state, &alice, "r1").await.unwrap();
        let app = create_app(state);

        let response = app.clone().oneshot(request(Method::GET, "/api/v1/diagnostics", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let user = user_token(TEST_SECRET, "alice");
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/v1/diagnostics", Some(&user)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request(Method::GET, "/api/v1/diagnostics", Some(&admin_token())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["n_conn"], 1);
        assert_eq!(body["n_rooms"], 1);
        assert_eq!(body["n_participants"], 1);
    }

    #[tokio::test]
    async fn admin_kick_removes_the_participant() {
        let state = test_state(Arc::new(MemoryStore::open()));
        let (bob, mut rx) = connect(&state, "cb", "bob");
        join_room(&state, &bob, "r1").await.unwrap();
        drain(&mut rx);
        let app = create_app(state.clone());

        let response = app
            .oneshot(request(
                Method::DELETE,
                "/api/v1/rooms/r1/participants/bob",
                Some(&admin_token()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: KickResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert!(body.kicked);
        assert_eq!(body.room_id, "r1");

        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::Kicked(KickedMessage { room_id: "r1".into() })]
        );
        assert!(!state.registry.contains("r1"));
    }
}
