use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, AgentProfile};

/// Token material handed to a client after a successful login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
    pub issued_at: DateTime<Utc>,
}

impl TokenPair {
    /// Remaining lifetime in seconds, negative once expired.
    pub fn remaining_lifetime(&self) -> i64 {
        let expiry = self.issued_at + chrono::Duration::seconds(self.expires_in as i64);
        (expiry - Utc::now()).num_seconds()
    }
}

/// Server-side record backing an access token. The embedded identity is the
/// redacted [`AgentProfile`] captured at issue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub agent_id: AgentId,
    pub identity: AgentProfile,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Server-side record backing a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshEntry {
    pub token: String,
    pub agent_id: AgentId,
    pub expires_at: DateTime<Utc>,
}

impl RefreshEntry {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
