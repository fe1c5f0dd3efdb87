//! Agent records and archetype-driven communication styles.
//!
//! An [`Agent`] is a simulated conversational participant: an identity, a
//! behavioral archetype ([`AgentKind`]), an optional free-form description,
//! and a busy/free reservation flag ([`AgentStatus`]). Agents do not own an
//! LLM client — the generation driver speaks on their behalf, steering the
//! model with a per-agent style line produced by a [`StylePolicy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Closed set of behavioral archetypes. Each implies a distinct
/// communication-style policy consumed by the generation driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Curious, asks questions, admits gaps in knowledge.
    Learning,
    /// Helpful and cooperative, keeps the discussion moving.
    Assistant,
    /// Deep domain knowledge, precise and opinionated.
    Specialist,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Learning => write!(f, "learning"),
            AgentKind::Assistant => write!(f, "assistant"),
            AgentKind::Specialist => write!(f, "specialist"),
        }
    }
}

/// Reservation status of an agent.
///
/// An agent is `Active` iff it is currently a participant in at least one
/// non-terminal conversation it was reserved for at conversation creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Reserved by a running or paused conversation.
    Active,
    /// Free to join a conversation; the only state in which deletion is legal.
    Inactive,
}

/// A simulated conversational participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier referenced by conversations and messages.
    pub id: Uuid,
    /// Human-readable display name, unique across the registry.
    pub name: String,
    /// Behavioral archetype driving the generated communication style.
    pub kind: AgentKind,
    /// Free-form description of the agent's strengths or persona.
    pub description: Option<String>,
    /// Busy/free reservation flag.
    pub status: AgentStatus,
    /// When the agent was registered.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new agent record. New agents always start `Inactive`.
    pub fn new(name: impl Into<String>, kind: AgentKind, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            description,
            status: AgentStatus::Inactive,
            created_at: Utc::now(),
        }
    }
}

/// Pluggable derivation of a per-agent communication-style line.
///
/// The generation driver embeds one style line per participant into the
/// system instructions of every request. Keeping the derivation behind this
/// trait means the keyword sniffing below can be swapped for structured
/// metadata without touching the driver's control flow.
pub trait StylePolicy: Send + Sync {
    /// Produce a one-line communication-style description for `agent`.
    fn style_for(&self, agent: &Agent) -> String;
}

/// Default style policy keyed off the agent's archetype, with light keyword
/// sniffing over the free-text description to pick up tone hints.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchetypeStylePolicy;

impl StylePolicy for ArchetypeStylePolicy {
    fn style_for(&self, agent: &Agent) -> String {
        let base = match agent.kind {
            AgentKind::Learning => {
                "speaks with curiosity, asks clarifying questions, and openly admits what it does not know"
            }
            AgentKind::Assistant => {
                "speaks helpfully and cooperatively, summarizing progress and nudging the group toward the goal"
            }
            AgentKind::Specialist => {
                "speaks with precise domain expertise, offering concrete facts and firm recommendations"
            }
        };

        let mut style = base.to_string();
        if let Some(description) = &agent.description {
            let lowered = description.to_lowercase();
            if lowered.contains("formal") {
                style.push_str("; keeps a formal register");
            } else if lowered.contains("casual") || lowered.contains("friendly") {
                style.push_str("; keeps a casual, friendly register");
            }
            if lowered.contains("terse") || lowered.contains("brief") {
                style.push_str("; answers briefly");
            }
        }
        style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agents_start_inactive() {
        let agent = Agent::new("Ada", AgentKind::Specialist, None);
        assert_eq!(agent.status, AgentStatus::Inactive);
        assert_eq!(agent.kind, AgentKind::Specialist);
    }

    #[test]
    fn style_policy_reflects_kind_and_description() {
        let policy = ArchetypeStylePolicy;

        let plain = Agent::new("Bob", AgentKind::Learning, None);
        assert!(policy.style_for(&plain).contains("curiosity"));

        let formal = Agent::new(
            "Carol",
            AgentKind::Assistant,
            Some("A formal, brief negotiator".to_string()),
        );
        let style = policy.style_for(&formal);
        assert!(style.contains("formal register"));
        assert!(style.contains("answers briefly"));
    }
}
