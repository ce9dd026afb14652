use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::storage::traits::{AgentFilter, Page, Storage};
use crate::types::{Agent, AgentId, RefreshEntry, Session};

/// In-memory store for tests and single-node development. Soft-deleted
/// agents stay in the map but are invisible to every query.
#[derive(Clone)]
pub struct InMemoryStore {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(agent: &Agent, filter: &AgentFilter) -> bool {
    if agent.deleted {
        return false;
    }
    if !filter.include_hidden && agent.hidden {
        return false;
    }
    if let Some(state) = filter.state {
        if agent.state.current != state {
            return false;
        }
    }
    if let Some(q) = &filter.q {
        let q = q.to_lowercase();
        let in_display = agent
            .display_name
            .as_deref()
            .map(|d| d.to_lowercase().contains(&q))
            .unwrap_or(false);
        if !agent.username.to_lowercase().contains(&q)
            && !agent.email.to_lowercase().contains(&q)
            && !in_display
        {
            return false;
        }
    }
    true
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn create_agent(&self, agent: &Agent) -> Result<()> {
        let mut agents = self.agents.write().unwrap();
        let clash = agents
            .values()
            .any(|a| !a.deleted && (a.username == agent.username || a.email == agent.email));
        if clash {
            bail!("username or email already in use");
        }
        agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>> {
        let agents = self.agents.read().unwrap();
        Ok(agents.get(&id).filter(|a| !a.deleted).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Agent>> {
        let agents = self.agents.read().unwrap();
        Ok(agents
            .values()
            .find(|a| !a.deleted && a.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Agent>> {
        let agents = self.agents.read().unwrap();
        Ok(agents
            .values()
            .find(|a| !a.deleted && a.email == email)
            .cloned())
    }

    async fn update_agent(&self, agent: &Agent) -> Result<()> {
        let mut agents = self.agents.write().unwrap();
        agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn list_agents(&self, filter: &AgentFilter, page: Page) -> Result<(Vec<Agent>, u64)> {
        let agents = self.agents.read().unwrap();
        let mut rows: Vec<Agent> = agents
            .values()
            .filter(|a| matches_filter(a, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect();
        Ok((rows, total))
    }

    async fn delete_agent(&self, id: AgentId) -> Result<bool> {
        let mut agents = self.agents.write().unwrap();
        match agents.get_mut(&id) {
            Some(agent) if !agent.deleted => {
                agent.deleted = true;
                agent.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn put_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(token);
        Ok(())
    }

    async fn put_refresh(&self, entry: &RefreshEntry) -> Result<()> {
        let mut refresh_tokens = self.refresh_tokens.write().unwrap();
        refresh_tokens.insert(entry.token.clone(), entry.clone());
        Ok(())
    }

    async fn get_refresh(&self, token: &str) -> Result<Option<RefreshEntry>> {
        let refresh_tokens = self.refresh_tokens.read().unwrap();
        Ok(refresh_tokens.get(token).cloned())
    }

    async fn delete_refresh(&self, token: &str) -> Result<()> {
        let mut refresh_tokens = self.refresh_tokens.write().unwrap();
        refresh_tokens.remove(token);
        Ok(())
    }
}
