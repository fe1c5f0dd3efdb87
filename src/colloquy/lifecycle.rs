//! Conversation lifecycle manager.
//!
//! The state machine enforcing legal transitions between conversation states
//! and the coupled agent-reservation side effects:
//!
//! ```text
//! Active ⇄ Paused
//! Active → Completed          (natural goal achievement, terminal)
//! Active | Paused → Terminated (manual/forced end, terminal)
//! ```
//!
//! Conversation creation is the only path that reserves agents; completion
//! and termination release them exactly once. Pausing freezes progress
//! without releasing resources — participants are busy but idle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::colloquy::conversation::{
    ChatMessage, Conversation, ConversationStatus, Recipients, MAX_PARTICIPANTS, MIN_PARTICIPANTS,
};
use crate::colloquy::registry::{AgentRegistry, RegistryError};
use crate::colloquy::store::{ConversationRepository, StoreError};

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Clone)]
pub enum ConversationError {
    /// No conversation with the given id exists.
    NotFound(Uuid),

    /// Another conversation already uses the requested name.
    DuplicateName(String),

    /// The requested transition is illegal from the current state.
    InvalidState {
        current: ConversationStatus,
        operation: &'static str,
    },

    /// Participant count outside the accepted 2–10 range.
    InvalidParticipantCount(usize),

    /// The same agent id was listed more than once.
    DuplicateParticipant(Uuid),

    /// A participant id did not resolve to a registered agent.
    AgentNotFound(Uuid),

    /// A participant is already reserved by another conversation.
    AgentNotAvailable(String),

    /// The message sender is not in the participant roster.
    NotParticipant(Uuid),

    /// An explicit recipient is not in the participant roster.
    InvalidRecipients(String),

    /// The registry failed outside the taxonomy above.
    Registry(RegistryError),

    /// The backing repository failed.
    Store(StoreError),
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationError::NotFound(id) => write!(f, "Conversation not found: {}", id),
            ConversationError::DuplicateName(name) => {
                write!(f, "Conversation name already taken: {}", name)
            }
            ConversationError::InvalidState { current, operation } => {
                write!(f, "Cannot {} a {} conversation", operation, current)
            }
            ConversationError::InvalidParticipantCount(count) => write!(
                f,
                "Conversations take {} to {} participants, got {}",
                MIN_PARTICIPANTS, MAX_PARTICIPANTS, count
            ),
            ConversationError::DuplicateParticipant(id) => {
                write!(f, "Agent {} is listed more than once", id)
            }
            ConversationError::AgentNotFound(id) => write!(f, "Agent not found: {}", id),
            ConversationError::AgentNotAvailable(name) => {
                write!(f, "Agent not available: {}", name)
            }
            ConversationError::NotParticipant(id) => {
                write!(f, "Agent {} is not a participant", id)
            }
            ConversationError::InvalidRecipients(msg) => {
                write!(f, "Invalid recipients: {}", msg)
            }
            ConversationError::Registry(err) => write!(f, "Registry error: {}", err),
            ConversationError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl Error for ConversationError {}

impl From<StoreError> for ConversationError {
    fn from(err: StoreError) -> Self {
        ConversationError::Store(err)
    }
}

impl From<RegistryError> for ConversationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ConversationError::AgentNotFound(id),
            RegistryError::AgentNotAvailable(name) => ConversationError::AgentNotAvailable(name),
            other => ConversationError::Registry(other),
        }
    }
}

/// Aggregate view over all conversations, exposed to presentation layers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversationStatistics {
    /// Total number of conversations ever created.
    pub total_conversations: usize,
    /// Conversation counts keyed by lifecycle state.
    pub by_status: HashMap<ConversationStatus, usize>,
    /// Number of messages each agent has sent, across all conversations.
    pub messages_per_agent: HashMap<Uuid, usize>,
    /// Number of conversations each agent participates (or participated) in.
    pub conversations_per_agent: HashMap<Uuid, usize>,
}

/// The lifecycle manager owning all conversation state transitions.
pub struct ConversationManager {
    repository: Arc<dyn ConversationRepository>,
    registry: Arc<AgentRegistry>,
}

impl ConversationManager {
    pub fn new(repository: Arc<dyn ConversationRepository>, registry: Arc<AgentRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Handle to the agent registry shared with this manager.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Create a conversation and atomically reserve every participant.
    ///
    /// This is the only path that reserves agents. All-or-nothing: if any
    /// participant is unresolved, busy, or listed twice, no agent is flipped
    /// and nothing is persisted. The new conversation always starts `Active`
    /// with an empty message log.
    pub async fn create(
        &self,
        name: impl Into<String>,
        topic: impl Into<String>,
        goal: impl Into<String>,
        surrounding: impl Into<String>,
        participants: Vec<Uuid>,
    ) -> Result<Conversation, ConversationError> {
        let name = name.into();
        if self.repository.find_by_name(&name).await?.is_some() {
            return Err(ConversationError::DuplicateName(name));
        }
        if participants.len() < MIN_PARTICIPANTS || participants.len() > MAX_PARTICIPANTS {
            return Err(ConversationError::InvalidParticipantCount(
                participants.len(),
            ));
        }
        // A repeated id would slip through reserve_all (the availability read
        // precedes any flip), leaving one agent talking to itself.
        let mut seen = HashSet::with_capacity(participants.len());
        for participant in &participants {
            if !seen.insert(*participant) {
                return Err(ConversationError::DuplicateParticipant(*participant));
            }
        }

        self.registry.reserve_all(&participants).await?;

        let conversation = Conversation {
            id: Uuid::new_v4(),
            name,
            topic: topic.into(),
            goal: goal.into(),
            surrounding: surrounding.into(),
            status: ConversationStatus::Active,
            participants: participants.clone(),
            started_at: Utc::now(),
            ended_at: None,
            goal_achieved: None,
        };

        match self.repository.create(conversation).await {
            Ok(conversation) => {
                log::info!(
                    "Started conversation '{}' with {} participants",
                    conversation.name,
                    conversation.participants.len()
                );
                Ok(conversation)
            }
            Err(err) => {
                // Undo the reservation so the agents are not stranded busy.
                if let Err(release_err) = self.registry.release_all(&participants).await {
                    log::error!(
                        "Failed to release agents after aborted creation: {}",
                        release_err
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Pause an `Active` conversation. Participants stay reserved.
    pub async fn pause(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        let mut conversation = self.get(id).await?;
        if conversation.status != ConversationStatus::Active {
            return Err(ConversationError::InvalidState {
                current: conversation.status,
                operation: "pause",
            });
        }
        conversation.status = ConversationStatus::Paused;
        Ok(self.repository.update(conversation).await?)
    }

    /// Resume a `Paused` conversation.
    pub async fn unpause(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        let mut conversation = self.get(id).await?;
        if conversation.status != ConversationStatus::Paused {
            return Err(ConversationError::InvalidState {
                current: conversation.status,
                operation: "unpause",
            });
        }
        conversation.status = ConversationStatus::Active;
        Ok(self.repository.update(conversation).await?)
    }

    /// Best-effort sweep pausing every currently `Active` conversation.
    /// Each transition is attempted independently; a failure on one
    /// conversation is logged and does not block the others. Returns how
    /// many conversations were paused.
    pub async fn pause_all(&self) -> Result<usize, ConversationError> {
        let conversations = self.repository.find_all().await?;
        let mut paused = 0;
        for conversation in conversations {
            if conversation.status != ConversationStatus::Active {
                continue;
            }
            match self.pause(conversation.id).await {
                Ok(_) => paused += 1,
                Err(err) => {
                    log::warn!("pause_all: could not pause '{}': {}", conversation.name, err)
                }
            }
        }
        Ok(paused)
    }

    /// Complete an `Active` conversation, recording whether the goal was
    /// achieved. Releases all participants exactly once. Irreversible.
    pub async fn complete(
        &self,
        id: Uuid,
        goal_achieved: bool,
    ) -> Result<Conversation, ConversationError> {
        let mut conversation = self.get(id).await?;
        if conversation.status != ConversationStatus::Active {
            return Err(ConversationError::InvalidState {
                current: conversation.status,
                operation: "complete",
            });
        }
        conversation.status = ConversationStatus::Completed;
        conversation.ended_at = Some(Utc::now());
        conversation.goal_achieved = Some(goal_achieved);
        let conversation = self.repository.update(conversation).await?;

        self.registry.release_all(&conversation.participants).await?;
        log::info!(
            "Completed conversation '{}' (goal achieved: {})",
            conversation.name,
            goal_achieved
        );
        Ok(conversation)
    }

    /// Forcibly end an `Active` or `Paused` conversation. Releases all
    /// participants and records the goal as not achieved. Irreversible.
    pub async fn terminate(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        let mut conversation = self.get(id).await?;
        if conversation.status.is_terminal() {
            return Err(ConversationError::InvalidState {
                current: conversation.status,
                operation: "terminate",
            });
        }
        conversation.status = ConversationStatus::Terminated;
        conversation.ended_at = Some(Utc::now());
        conversation.goal_achieved = Some(false);
        let conversation = self.repository.update(conversation).await?;

        self.registry.release_all(&conversation.participants).await?;
        log::info!("Terminated conversation '{}'", conversation.name);
        Ok(conversation)
    }

    /// Append a message to an `Active` conversation.
    ///
    /// The sender must be a participant; explicit recipients must all be
    /// participants. `Recipients::All` is expanded to the full roster before
    /// storage so every stored message carries an explicit recipient set.
    /// This does not evaluate goal completion — that is the generation
    /// driver's responsibility.
    pub async fn add_message(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        content: impl Into<String>,
        recipients: Recipients,
    ) -> Result<ChatMessage, ConversationError> {
        let conversation = self.get(conversation_id).await?;
        if conversation.status != ConversationStatus::Active {
            return Err(ConversationError::InvalidState {
                current: conversation.status,
                operation: "add a message to",
            });
        }
        if !conversation.is_participant(&sender) {
            return Err(ConversationError::NotParticipant(sender));
        }

        let recipients = match recipients {
            Recipients::All => conversation.participants.clone(),
            Recipients::Only(list) => {
                if list.is_empty() {
                    return Err(ConversationError::InvalidRecipients(
                        "explicit recipient list is empty".to_string(),
                    ));
                }
                for recipient in &list {
                    if !conversation.is_participant(recipient) {
                        return Err(ConversationError::InvalidRecipients(format!(
                            "{} is not a participant",
                            recipient
                        )));
                    }
                }
                list
            }
        };

        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            recipients,
            content: content.into(),
            sent_at: Utc::now(),
        };
        Ok(self.repository.add_message(conversation_id, message).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(ConversationError::NotFound(id))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Conversation>, ConversationError> {
        Ok(self.repository.find_by_name(name).await?)
    }

    pub async fn list(&self) -> Result<Vec<Conversation>, ConversationError> {
        Ok(self.repository.find_all().await?)
    }

    /// All `Active` conversations, in creation order. The scheduler sweeps
    /// over this set.
    pub async fn list_active(&self) -> Result<Vec<Conversation>, ConversationError> {
        Ok(self
            .repository
            .find_all()
            .await?
            .into_iter()
            .filter(|c| c.status == ConversationStatus::Active)
            .collect())
    }

    /// The ordered message log of a conversation.
    pub async fn messages(&self, id: Uuid) -> Result<Vec<ChatMessage>, ConversationError> {
        match self.repository.messages(id).await {
            Ok(messages) => Ok(messages),
            Err(StoreError::NotFound(_)) => Err(ConversationError::NotFound(id)),
        }
    }

    /// Aggregate counts by status plus per-agent message and conversation
    /// counts.
    pub async fn statistics(&self) -> Result<ConversationStatistics, ConversationError> {
        let conversations = self.repository.find_all().await?;
        let mut stats = ConversationStatistics {
            total_conversations: conversations.len(),
            ..Default::default()
        };

        for conversation in &conversations {
            *stats.by_status.entry(conversation.status).or_insert(0) += 1;
            for participant in &conversation.participants {
                *stats
                    .conversations_per_agent
                    .entry(*participant)
                    .or_insert(0) += 1;
            }
            for message in self.repository.messages(conversation.id).await? {
                *stats.messages_per_agent.entry(message.sender).or_insert(0) += 1;
            }
        }
        Ok(stats)
    }
}
