use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Agent, AgentSummary};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    Created,
    Updated,
    StateChanged,
    Deleted,
}

impl AgentEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            AgentEventKind::Created => "created",
            AgentEventKind::Updated => "updated",
            AgentEventKind::StateChanged => "state_changed",
            AgentEventKind::Deleted => "deleted",
        }
    }
}

/// Change notification. Carries the summary projection only, so the
/// credential field can never transit the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: AgentEventKind,
    pub agent: AgentSummary,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a change. Dropped silently when nobody is subscribed.
    pub fn publish(&self, kind: AgentEventKind, agent: &Agent) {
        let _ = self.tx.send(AgentEvent {
            kind,
            agent: agent.summary(),
            at: Utc::now(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
