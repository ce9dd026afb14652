use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use thiserror::Error;

use crate::auth::credentials;
use crate::lifecycle::AccountStateMachine;
use crate::storage::Storage;
use crate::types::{Agent, AgentId, AgentProfile, RefreshEntry, Session, TokenPair};

pub const DEFAULT_ACCESS_TTL_SECS: i64 = 5 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 3600 * 24 * 7;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("agent is not active")]
    NotActive,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Verifies credentials and issues opaque bearer tokens. The identity bound
/// to a token is always the redacted [`AgentProfile`] — the credential field
/// never enters a session record.
pub struct AuthService {
    storage: Arc<dyn Storage>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl AuthService {
    pub fn new(storage: Arc<dyn Storage>, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            storage,
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(TokenPair, AgentProfile), AuthError> {
        let mut agent = self
            .storage
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !credentials::verify_password(&agent.password_hash, password) {
            tracing::debug!(username, "password verification failed");
            return Err(AuthError::InvalidCredentials);
        }

        // A lapsed timed suspension lifts on the next login attempt.
        let before = agent.state.current;
        AccountStateMachine::check_suspension_expiry(&mut agent)?;
        if agent.state.current != before {
            self.storage.update_agent(&agent).await?;
        }

        if !agent.is_active() {
            tracing::debug!(username, state = agent.state.current.as_str(), "login refused");
            return Err(AuthError::NotActive);
        }

        let identity = AgentProfile::from(&agent);
        let pair = self.issue(&agent, &identity, true).await?;
        tracing::info!(username, id = %agent.id, "agent logged in");
        Ok((pair, identity))
    }

    /// Resolve a bearer token to the identity captured at issue time.
    /// Expired sessions are reaped on sight.
    pub async fn authenticate(&self, token: &str) -> Result<AgentProfile, AuthError> {
        match self.storage.get_session(token).await? {
            Some(session) if !session.is_expired() => Ok(session.identity),
            Some(session) => {
                self.storage.delete_session(&session.token).await?;
                Err(AuthError::InvalidToken)
            }
            None => Err(AuthError::InvalidToken),
        }
    }

    /// Exchange a live refresh token for a fresh access token bound to the
    /// current state of the agent record.
    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(TokenPair, AgentProfile), AuthError> {
        let entry = self
            .storage
            .get_refresh(refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if entry.is_expired() {
            self.storage.delete_refresh(&entry.token).await?;
            return Err(AuthError::InvalidToken);
        }

        let agent = self
            .storage
            .get_agent(entry.agent_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !agent.is_active() {
            return Err(AuthError::NotActive);
        }

        let now = Utc::now();
        // Sliding refresh window: every exchange renews the deadline.
        self.storage
            .put_refresh(&RefreshEntry {
                token: refresh_token.to_string(),
                agent_id: agent.id,
                expires_at: now + Duration::seconds(self.refresh_ttl_secs),
            })
            .await?;

        let identity = AgentProfile::from(&agent);
        let access_token = token_string(agent.id);
        self.storage
            .put_session(&Session {
                token: access_token.clone(),
                agent_id: agent.id,
                identity: identity.clone(),
                refresh_token: Some(refresh_token.to_string()),
                issued_at: now,
                expires_at: now + Duration::seconds(self.access_ttl_secs),
            })
            .await?;

        Ok((
            TokenPair {
                access_token,
                refresh_token: Some(refresh_token.to_string()),
                token_type: "Bearer".to_string(),
                expires_in: self.access_ttl_secs.max(0) as u64,
                issued_at: now,
            },
            identity,
        ))
    }

    /// Drop the session behind a bearer token along with its linked refresh
    /// token. Unknown tokens are a no-op.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some(session) = self.storage.get_session(token).await? {
            if let Some(refresh_token) = &session.refresh_token {
                self.storage.delete_refresh(refresh_token).await?;
            }
            self.storage.delete_session(&session.token).await?;
            tracing::info!(id = %session.agent_id, "agent logged out");
        }
        Ok(())
    }

    async fn issue(
        &self,
        agent: &Agent,
        identity: &AgentProfile,
        with_refresh: bool,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_token = token_string(agent.id);
        let refresh_token = with_refresh.then(|| token_string(agent.id));

        if let Some(token) = &refresh_token {
            self.storage
                .put_refresh(&RefreshEntry {
                    token: token.clone(),
                    agent_id: agent.id,
                    expires_at: now + Duration::seconds(self.refresh_ttl_secs),
                })
                .await?;
        }

        self.storage
            .put_session(&Session {
                token: access_token.clone(),
                agent_id: agent.id,
                identity: identity.clone(),
                refresh_token: refresh_token.clone(),
                issued_at: now,
                expires_at: now + Duration::seconds(self.access_ttl_secs),
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_secs.max(0) as u64,
            issued_at: now,
        })
    }
}

/// Opaque token: `<agent_id>_<32 random bytes, url-safe base64>`.
fn token_string(agent_id: AgentId) -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}_{}", agent_id, URL_SAFE_NO_PAD.encode(bytes))
}
