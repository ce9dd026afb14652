use anyhow::Result;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::auth::AuthService;
use crate::events::EventBus;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<AuthService>,
    pub events: EventBus,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        let auth = Arc::new(AuthService::new(
            storage.clone(),
            access_ttl_secs,
            refresh_ttl_secs,
        ));
        Self {
            storage,
            auth,
            events: EventBus::new(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/config", get(handlers::get_config))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh_session))
        .route("/auth/session", get(handlers::whoami))
        .route("/auth/logout", delete(handlers::logout))
        .route("/agents", post(handlers::create_agent))
        .route("/agents", get(handlers::list_agents))
        .route("/agents/events", get(handlers::stream_events))
        .route("/agents/:id", get(handlers::get_agent))
        .route("/agents/:id", patch(handlers::update_agent))
        .route("/agents/:id", delete(handlers::delete_agent))
        .route("/agents/:id/state", post(handlers::change_state))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!(port, "warden API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::DEFAULT_REFRESH_TTL_SECS;
    use crate::storage::memory::InMemoryStore;

    fn create_test_app() -> Router {
        let storage = Arc::new(InMemoryStore::new());
        let state = AppState::new(storage as Arc<dyn Storage>, 300, DEFAULT_REFRESH_TTL_SECS);
        create_router(state)
    }

    #[tokio::test]
    async fn test_create_router() {
        let _router = create_test_app();
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_get_config() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert!(json["version"].is_string());
        assert_eq!(json["access_token_ttl_secs"], 300);
    }

    #[tokio::test]
    async fn test_agents_require_bearer_token() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/agents")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["statusCode"], 401);
    }

    #[tokio::test]
    async fn test_login_unknown_agent_unauthorized() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"username": "ghost", "password": "whatever1"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
