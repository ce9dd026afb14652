use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, AgentState};

/// Field names stripped from an agent record before it crosses a trust
/// boundary (API responses, token identities, published events).
///
/// Must list exactly the fields of [`Agent`] that have no counterpart in
/// [`AgentProfile`].
pub const EXCLUDED_AGENT_FIELDS: &[&str] = &["password_hash"];

/// Full agent record as stored.
///
/// `password_hash` is the credential field: it never leaves the service.
/// Convert to an [`AgentProfile`] before serializing a record for anything
/// outside the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub third_party_auth: Option<String>,
    pub base_url: Option<String>,
    pub state: StateInfo,
    pub security: SecurityInfo,
    pub hidden: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateInfo {
    pub current: AgentState,
    pub last_changed_at: DateTime<Utc>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspended_until: Option<DateTime<Utc>>,
    pub suspended_reason: Option<String>,
}

impl Default for StateInfo {
    fn default() -> Self {
        Self {
            current: AgentState::Pending,
            last_changed_at: Utc::now(),
            suspended_at: None,
            suspended_until: None,
            suspended_reason: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityInfo {
    #[serde(default)]
    pub api_key_enabled: bool,
    #[serde(default)]
    pub allowed_networks: Vec<String>,
}

impl Agent {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new_v4(),
            username,
            email,
            password_hash,
            display_name: None,
            third_party_auth: None,
            base_url: None,
            state: StateInfo::default(),
            security: SecurityInfo::default(),
            hidden: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.current == AgentState::Active
    }

    pub fn profile(&self) -> AgentProfile {
        AgentProfile::from(self)
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            state: self.state.current,
            hidden: self.hidden,
        }
    }

    /// Apply a partial update. The plaintext `password` field is ignored
    /// here; callers hash it and set `password_hash` themselves.
    pub fn apply(&mut self, patch: &AgentPatch) {
        if let Some(username) = &patch.username {
            self.username = username.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(display_name) = &patch.display_name {
            self.display_name = Some(display_name.clone());
        }
        if let Some(third_party_auth) = &patch.third_party_auth {
            self.third_party_auth = Some(third_party_auth.clone());
        }
        if let Some(base_url) = &patch.base_url {
            self.base_url = Some(base_url.clone());
        }
        if let Some(security) = &patch.security {
            self.security = security.clone();
        }
        if let Some(hidden) = patch.hidden {
            self.hidden = hidden;
        }
    }
}

/// Partial, credential-free view of an [`Agent`]: every schema field except
/// those in [`EXCLUDED_AGENT_FIELDS`], each one optional.
///
/// This is the shape that crosses trust boundaries — API responses and the
/// identity embedded in issued tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_party_auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Agent> for AgentProfile {
    fn from(agent: &Agent) -> Self {
        Self {
            id: Some(agent.id),
            username: Some(agent.username.clone()),
            email: Some(agent.email.clone()),
            display_name: agent.display_name.clone(),
            third_party_auth: agent.third_party_auth.clone(),
            base_url: agent.base_url.clone(),
            state: Some(agent.state.clone()),
            security: Some(agent.security.clone()),
            hidden: Some(agent.hidden),
            deleted: Some(agent.deleted),
            created_at: Some(agent.created_at),
            updated_at: Some(agent.updated_at),
        }
    }
}

/// Projection returned by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub username: String,
    pub display_name: Option<String>,
    pub state: AgentState,
    pub hidden: bool,
}

/// Creation payload. `password` arrives in plaintext and is hashed before
/// the record is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub third_party_auth: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub security: Option<SecurityInfo>,
    #[serde(default)]
    pub hidden: bool,
}

/// Partial update payload. Account state is not patchable; it only moves
/// through the lifecycle state machine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub third_party_auth: Option<String>,
    pub base_url: Option<String>,
    pub security: Option<SecurityInfo>,
    pub hidden: Option<bool>,
}
