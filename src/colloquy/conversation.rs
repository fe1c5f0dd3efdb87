//! Conversation and message records.
//!
//! A [`Conversation`] is a bounded, goal-directed multi-party exchange with
//! its own state machine (see [`ConversationStatus`]). Its participant list
//! is fixed at creation; its message log is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Minimum number of participants in a conversation.
pub const MIN_PARTICIPANTS: usize = 2;
/// Maximum number of participants in a conversation.
pub const MAX_PARTICIPANTS: usize = 10;

/// Lifecycle state of a conversation.
///
/// Legal transitions: `Active ⇄ Paused`, `Active → Completed`,
/// `Active | Paused → Terminated`. No transition leaves a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Progressing; eligible for scheduler sweeps and new messages.
    Active,
    /// Frozen without releasing participants. No new messages accepted.
    Paused,
    /// Terminal: the goal-check judged the stated goal achieved.
    Completed,
    /// Terminal: manually or forcibly ended; goal recorded as not achieved.
    Terminated,
}

impl ConversationStatus {
    /// Whether the state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationStatus::Completed | ConversationStatus::Terminated
        )
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Paused => write!(f, "paused"),
            ConversationStatus::Completed => write!(f, "completed"),
            ConversationStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Addressing of a message at the `add_message` boundary.
///
/// Stored messages always carry an explicit recipient list: `All` is
/// expanded to the full participant roster before persisting so every stored
/// message has a queryable recipient set regardless of how it was specified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Broadcast to every participant.
    All,
    /// An explicit subset of participants, validated against the roster.
    Only(Vec<Uuid>),
}

/// One entry in a conversation's append-only message log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Stable identifier of this message.
    pub id: Uuid,
    /// The conversation this message belongs to.
    pub conversation_id: Uuid,
    /// Sending agent; always a participant of the conversation.
    pub sender: Uuid,
    /// Expanded recipient list; always a subset of the participants.
    pub recipients: Vec<Uuid>,
    /// Opaque message text.
    pub content: String,
    /// Append timestamp; the log is strictly ordered by it.
    pub sent_at: DateTime<Utc>,
}

/// A goal-directed multi-party exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    /// Stable identifier referenced by messages and the scheduler.
    pub id: Uuid,
    /// Unique human-readable name.
    pub name: String,
    /// What the participants talk about.
    pub topic: String,
    /// Free text describing the target agreement or outcome.
    pub goal: String,
    /// Narrative environment description injected into generation context.
    pub surrounding: String,
    /// Current lifecycle state.
    pub status: ConversationStatus,
    /// Participant agent ids, 2–10, fixed at creation.
    pub participants: Vec<Uuid>,
    /// When the conversation was created (it starts `Active`).
    pub started_at: DateTime<Utc>,
    /// Stamped on completion or termination.
    pub ended_at: Option<DateTime<Utc>>,
    /// Set only when a terminal transition records the goal verdict.
    pub goal_achieved: Option<bool>,
}

impl Conversation {
    /// Whether the given agent is in the participant roster.
    pub fn is_participant(&self, agent_id: &Uuid) -> bool {
        self.participants.contains(agent_id)
    }
}
