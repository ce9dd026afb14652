use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use warden::api::{create_router, AppState};
use warden::auth::credentials::hash_password;
use warden::lifecycle::{AccountEvent, AccountStateMachine};
use warden::storage::memory::InMemoryStore;
use warden::storage::Storage;
use warden::types::{Agent, EXCLUDED_AGENT_FIELDS};

const PASSWORD: &str = "operator-pass-1";

async fn state_with_agent(event: Option<AccountEvent>) -> AppState {
    let storage = Arc::new(InMemoryStore::new());
    let mut agent = Agent::new(
        "operator".to_string(),
        "operator@example.com".to_string(),
        hash_password(PASSWORD),
    );
    if let Some(event) = event {
        AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();
        if !matches!(event, AccountEvent::Approved) {
            AccountStateMachine::transition(&mut agent, event).unwrap();
        }
    }
    storage.create_agent(&agent).await.unwrap();
    AppState::new(storage as Arc<dyn Storage>, 300, 3600)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_login(app: &Router, username: &str, password: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"username": username, "password": password}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_session(app: &Router, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri("/auth/session")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_login_returns_tokens_and_redacted_identity() {
    let state = state_with_agent(Some(AccountEvent::Approved)).await;
    let app = create_router(state);

    let response = post_login(&app, "operator", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 300);
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert_eq!(body["identity"]["username"], "operator");
    for field in EXCLUDED_AGENT_FIELDS {
        assert!(body["identity"].get(*field).is_none());
    }
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let state = state_with_agent(Some(AccountEvent::Approved)).await;
    let app = create_router(state);

    let response = post_login(&app, "operator", "not-the-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_pending_agent_forbidden() {
    let state = state_with_agent(None).await;
    let app = create_router(state);

    let response = post_login(&app, "operator", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_suspended_agent_forbidden() {
    let state = state_with_agent(Some(AccountEvent::Suspended {
        until: Some(Utc::now() + chrono::Duration::hours(1)),
        reason: Some("key rotation".to_string()),
    }))
    .await;
    let app = create_router(state);

    let response = post_login(&app, "operator", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_lapsed_suspension_lifts_on_login() {
    let state = state_with_agent(Some(AccountEvent::Suspended {
        until: Some(Utc::now() - chrono::Duration::seconds(5)),
        reason: None,
    }))
    .await;
    let app = create_router(state);

    let response = post_login(&app, "operator", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_introspection() {
    let state = state_with_agent(Some(AccountEvent::Approved)).await;
    let app = create_router(state);

    let login = body_json(post_login(&app, "operator", PASSWORD).await).await;
    let token = login["access_token"].as_str().unwrap();

    let response = get_session(&app, token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let identity = body_json(response).await;
    assert_eq!(identity["username"], "operator");
    for field in EXCLUDED_AGENT_FIELDS {
        assert!(identity.get(*field).is_none());
    }
}

#[tokio::test]
async fn test_refresh_issues_working_access_token() {
    let state = state_with_agent(Some(AccountEvent::Approved)).await;
    let app = create_router(state);

    let login = body_json(post_login(&app, "operator", PASSWORD).await).await;
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"refresh_token": refresh_token}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = body_json(response).await;

    let new_token = renewed["access_token"].as_str().unwrap();
    assert_ne!(new_token, login["access_token"].as_str().unwrap());

    let response = get_session(&app, new_token).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_with_garbage_token_unauthorized() {
    let state = state_with_agent(Some(AccountEvent::Approved)).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"refresh_token": "nonsense"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_invalidates_session_and_refresh() {
    let state = state_with_agent(Some(AccountEvent::Approved)).await;
    let app = create_router(state);

    let login = body_json(post_login(&app, "operator", PASSWORD).await).await;
    let token = login["access_token"].as_str().unwrap();
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/auth/logout")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get_session(&app, token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"refresh_token": refresh_token}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_access_token_rejected() {
    let storage = Arc::new(InMemoryStore::new());
    let mut agent = Agent::new(
        "operator".to_string(),
        "operator@example.com".to_string(),
        hash_password(PASSWORD),
    );
    AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();
    storage.create_agent(&agent).await.unwrap();
    // zero-second access TTL: tokens are dead on arrival
    let state = AppState::new(storage as Arc<dyn Storage>, 0, 3600);
    let app = create_router(state);

    let login = body_json(post_login(&app, "operator", PASSWORD).await).await;
    let token = login["access_token"].as_str().unwrap();

    let response = get_session(&app, token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
