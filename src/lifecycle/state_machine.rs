use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Agent, AgentState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccountEvent {
    Approved,
    Suspended {
        #[serde(default)]
        until: Option<DateTime<Utc>>,
        #[serde(default)]
        reason: Option<String>,
    },
    Reinstated,
    Retired,
}

pub struct AccountStateMachine;

impl AccountStateMachine {
    pub fn transition(agent: &mut Agent, event: AccountEvent) -> Result<AgentState> {
        let new_state = match (agent.state.current, &event) {
            (AgentState::Pending, AccountEvent::Approved) => AgentState::Active,
            (AgentState::Active, AccountEvent::Suspended { .. }) => AgentState::Suspended,
            (AgentState::Suspended, AccountEvent::Reinstated) => AgentState::Active,

            (
                AgentState::Pending | AgentState::Active | AgentState::Suspended,
                AccountEvent::Retired,
            ) => AgentState::Retired,

            _ => {
                return Err(anyhow!(
                    "Invalid state transition from {:?} with event {:?}",
                    agent.state.current,
                    event
                ));
            }
        };

        let now = Utc::now();
        match &event {
            AccountEvent::Suspended { until, reason } => {
                agent.state.suspended_at = Some(now);
                agent.state.suspended_until = *until;
                agent.state.suspended_reason = reason.clone();
            }
            _ => {
                agent.state.suspended_at = None;
                agent.state.suspended_until = None;
                agent.state.suspended_reason = None;
            }
        }

        agent.state.current = new_state;
        agent.state.last_changed_at = now;
        Ok(new_state)
    }

    /// Lift a suspension whose `suspended_until` deadline has passed.
    /// Open-ended suspensions (no deadline) are only lifted manually.
    pub fn check_suspension_expiry(agent: &mut Agent) -> Result<()> {
        if agent.state.current != AgentState::Suspended {
            return Ok(());
        }
        if let Some(until) = agent.state.suspended_until {
            if until <= Utc::now() {
                Self::transition(agent, AccountEvent::Reinstated)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_agent() -> Agent {
        Agent::new(
            "crawler-7".to_string(),
            "crawler-7@example.com".to_string(),
            "sha256$1$c2FsdA$ZGlnZXN0".to_string(),
        )
    }

    #[test]
    fn test_pending_to_active_on_approval() {
        let mut agent = create_test_agent();
        let state = AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();
        assert_eq!(state, AgentState::Active);
        assert_eq!(agent.state.current, AgentState::Active);
    }

    #[test]
    fn test_suspension_records_details() {
        let mut agent = create_test_agent();
        AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();

        let until = Utc::now() + chrono::Duration::hours(1);
        AccountStateMachine::transition(
            &mut agent,
            AccountEvent::Suspended {
                until: Some(until),
                reason: Some("key rotation".to_string()),
            },
        )
        .unwrap();

        assert_eq!(agent.state.current, AgentState::Suspended);
        assert!(agent.state.suspended_at.is_some());
        assert_eq!(agent.state.suspended_until, Some(until));
        assert_eq!(agent.state.suspended_reason.as_deref(), Some("key rotation"));
    }

    #[test]
    fn test_reinstatement_clears_suspension() {
        let mut agent = create_test_agent();
        AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();
        AccountStateMachine::transition(
            &mut agent,
            AccountEvent::Suspended {
                until: None,
                reason: Some("manual".to_string()),
            },
        )
        .unwrap();

        AccountStateMachine::transition(&mut agent, AccountEvent::Reinstated).unwrap();
        assert_eq!(agent.state.current, AgentState::Active);
        assert!(agent.state.suspended_at.is_none());
        assert!(agent.state.suspended_reason.is_none());
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut agent = create_test_agent();
        let result = AccountStateMachine::transition(&mut agent, AccountEvent::Reinstated);
        assert!(result.is_err());
        assert_eq!(agent.state.current, AgentState::Pending);
    }

    #[test]
    fn test_retired_is_terminal() {
        let mut agent = create_test_agent();
        AccountStateMachine::transition(&mut agent, AccountEvent::Retired).unwrap();
        assert!(AccountStateMachine::transition(&mut agent, AccountEvent::Approved).is_err());
        assert!(AccountStateMachine::transition(&mut agent, AccountEvent::Retired).is_err());
    }

    #[test]
    fn test_lapsed_suspension_is_lifted() {
        let mut agent = create_test_agent();
        AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();
        AccountStateMachine::transition(
            &mut agent,
            AccountEvent::Suspended {
                until: Some(Utc::now() - chrono::Duration::seconds(5)),
                reason: None,
            },
        )
        .unwrap();

        AccountStateMachine::check_suspension_expiry(&mut agent).unwrap();
        assert_eq!(agent.state.current, AgentState::Active);
    }

    #[test]
    fn test_open_ended_suspension_is_not_lifted() {
        let mut agent = create_test_agent();
        AccountStateMachine::transition(&mut agent, AccountEvent::Approved).unwrap();
        AccountStateMachine::transition(
            &mut agent,
            AccountEvent::Suspended {
                until: None,
                reason: None,
            },
        )
        .unwrap();

        AccountStateMachine::check_suspension_expiry(&mut agent).unwrap();
        assert_eq!(agent.state.current, AgentState::Suspended);
    }
}
