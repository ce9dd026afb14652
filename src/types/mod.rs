pub mod agent;
pub mod session;

pub use agent::{
    Agent, AgentPatch, AgentProfile, AgentSummary, NewAgent, SecurityInfo, StateInfo,
    EXCLUDED_AGENT_FIELDS,
};
pub use session::{RefreshEntry, Session, TokenPair};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AgentId = Uuid;

/// Account lifecycle state. New agents start in `Pending` and must be
/// approved before they can authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Pending,
    Active,
    Suspended,
    Retired,
}

impl AgentState {
    pub fn as_str(&self) -> &str {
        match self {
            AgentState::Pending => "Pending",
            AgentState::Active => "Active",
            AgentState::Suspended => "Suspended",
            AgentState::Retired => "Retired",
        }
    }
}
