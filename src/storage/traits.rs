use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Agent, AgentId, AgentState, RefreshEntry, Session};

/// Listing filter. Soft-deleted records are always excluded; hidden agents
/// only appear when `include_hidden` is set.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub state: Option<AgentState>,
    pub include_hidden: bool,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 25,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    // Agent records. Username and email are unique among non-deleted
    // agents; lookups never return soft-deleted rows.
    async fn create_agent(&self, agent: &Agent) -> Result<()>;
    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Agent>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Agent>>;
    async fn update_agent(&self, agent: &Agent) -> Result<()>;
    async fn list_agents(&self, filter: &AgentFilter, page: Page) -> Result<(Vec<Agent>, u64)>;
    async fn delete_agent(&self, id: AgentId) -> Result<bool>;

    // Access-token sessions
    async fn put_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, token: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token: &str) -> Result<()>;

    // Refresh tokens
    async fn put_refresh(&self, entry: &RefreshEntry) -> Result<()>;
    async fn get_refresh(&self, token: &str) -> Result<Option<RefreshEntry>>;
    async fn delete_refresh(&self, token: &str) -> Result<()>;
}
