use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::Utc;
use futures::Stream;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{BearerToken, Identity};
use crate::api::server::AppState;
use crate::auth::credentials;
use crate::events::AgentEventKind;
use crate::lifecycle::{AccountEvent, AccountStateMachine};
use crate::storage::{AgentFilter, Page};
use crate::types::{
    Agent, AgentPatch, AgentProfile, AgentState, AgentSummary, NewAgent, TokenPair,
};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{2,31}$").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PAGE_SIZE: i64 = 200;

fn validate_username(username: &str) -> Result<(), ApiError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "invalid username {:?}: expected 3-32 chars of [a-z0-9._-], starting alphanumeric",
            username
        )))
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("invalid email {:?}", email)))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )))
    }
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "access_token_ttl_secs": state.auth.access_ttl_secs(),
        "refresh_token_ttl_secs": state.auth.refresh_ttl_secs(),
    }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub identity: AgentProfile,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (tokens, identity) = state.auth.login(&body.username, &body.password).await?;
    Ok(Json(LoginResponse { tokens, identity }))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_session(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (tokens, identity) = state.auth.refresh(&body.refresh_token).await?;
    Ok(Json(LoginResponse { tokens, identity }))
}

pub async fn whoami(Identity(identity): Identity) -> Json<AgentProfile> {
    Json(identity)
}

pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, ApiError> {
    state.auth.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_agent(
    State(state): State<AppState>,
    _identity: Identity,
    Json(body): Json<NewAgent>,
) -> Result<(StatusCode, Json<AgentProfile>), ApiError> {
    validate_username(&body.username)?;
    validate_email(&body.email)?;
    validate_password(&body.password)?;

    if state
        .storage
        .find_by_username(&body.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "username {} already in use",
            body.username
        )));
    }
    if state.storage.find_by_email(&body.email).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "email {} already in use",
            body.email
        )));
    }

    let mut agent = Agent::new(
        body.username,
        body.email,
        credentials::hash_password(&body.password),
    );
    agent.display_name = body.display_name;
    agent.third_party_auth = body.third_party_auth;
    agent.base_url = body.base_url;
    if let Some(security) = body.security {
        agent.security = security;
    }
    agent.hidden = body.hidden;

    state.storage.create_agent(&agent).await?;
    state.events.publish(AgentEventKind::Created, &agent);
    tracing::info!(username = %agent.username, id = %agent.id, "agent created");

    Ok((StatusCode::CREATED, Json(AgentProfile::from(&agent))))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub state: Option<AgentState>,
    pub include_hidden: Option<bool>,
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub total: u64,
    pub data: Vec<AgentSummary>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    _identity: Identity,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let filter = AgentFilter {
        state: query.state,
        include_hidden: query.include_hidden.unwrap_or(false),
        q: query.q,
    };
    let page = Page {
        limit: query.limit.unwrap_or(25).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let (agents, total) = state.storage.list_agents(&filter, page).await?;
    Ok(Json(ListResponse {
        total,
        data: agents.iter().map(Agent::summary).collect(),
    }))
}

pub async fn get_agent(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<AgentProfile>, ApiError> {
    let agent = state
        .storage
        .get_agent(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(AgentProfile::from(&agent)))
}

pub async fn update_agent(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<Uuid>,
    Json(patch): Json<AgentPatch>,
) -> Result<Json<AgentProfile>, ApiError> {
    let mut agent = state
        .storage
        .get_agent(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(username) = &patch.username {
        if username != &agent.username {
            validate_username(username)?;
            if state.storage.find_by_username(username).await?.is_some() {
                return Err(ApiError::Conflict(format!(
                    "username {} already in use",
                    username
                )));
            }
        }
    }
    if let Some(email) = &patch.email {
        if email != &agent.email {
            validate_email(email)?;
            if state.storage.find_by_email(email).await?.is_some() {
                return Err(ApiError::Conflict(format!("email {} already in use", email)));
            }
        }
    }
    if let Some(password) = &patch.password {
        validate_password(password)?;
        agent.password_hash = credentials::hash_password(password);
    }

    agent.apply(&patch);
    agent.updated_at = Utc::now();
    state.storage.update_agent(&agent).await?;
    state.events.publish(AgentEventKind::Updated, &agent);

    Ok(Json(AgentProfile::from(&agent)))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let agent = state
        .storage
        .get_agent(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    state.storage.delete_agent(agent.id).await?;
    state.events.publish(AgentEventKind::Deleted, &agent);
    tracing::info!(username = %agent.username, id = %agent.id, "agent deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_state(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<Uuid>,
    Json(event): Json<AccountEvent>,
) -> Result<Json<AgentProfile>, ApiError> {
    let mut agent = state
        .storage
        .get_agent(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    AccountStateMachine::transition(&mut agent, event)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    agent.updated_at = Utc::now();
    state.storage.update_agent(&agent).await?;
    state.events.publish(AgentEventKind::StateChanged, &agent);

    Ok(Json(AgentProfile::from(&agent)))
}

pub async fn stream_events(
    State(state): State<AppState>,
    _identity: Identity,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|message| {
        match message {
            Ok(event) => Some(Event::default().event(event.kind.as_str()).json_data(&event)),
            // subscriber lagged behind the channel capacity, skip the gap
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
