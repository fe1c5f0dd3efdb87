//! Repository traits and in-memory reference implementations.
//!
//! Persistence is reached through simple CRUD repository traits. Services
//! enforce all domain invariants (name uniqueness, state transitions,
//! reservation discipline); repositories only move records. The in-memory
//! stores below back the test-suite and any single-process deployment;
//! database-backed implementations slot in behind the same traits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::colloquy::agent::Agent;
use crate::colloquy::conversation::{ChatMessage, Conversation};

/// Errors surfaced by repository implementations.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// No record with the given id exists.
    NotFound(Uuid),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Record not found: {}", id),
        }
    }
}

impl Error for StoreError {}

/// CRUD access to [`Agent`] records.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Agent>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, StoreError>;
    async fn create(&self, agent: Agent) -> Result<Agent, StoreError>;
    /// Replace the stored record with the same id. `NotFound` if absent.
    async fn update(&self, agent: Agent) -> Result<Agent, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// CRUD access to [`Conversation`] records plus their append-only message log.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Conversation>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Conversation>, StoreError>;
    async fn create(&self, conversation: Conversation) -> Result<Conversation, StoreError>;
    /// Replace the stored record with the same id. `NotFound` if absent.
    async fn update(&self, conversation: Conversation) -> Result<Conversation, StoreError>;
    /// The ordered message log of a conversation. `NotFound` if the
    /// conversation does not exist.
    async fn messages(&self, id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;
    /// Append one message to a conversation's log.
    async fn add_message(&self, id: Uuid, message: ChatMessage) -> Result<ChatMessage, StoreError>;
}

/// In-memory [`AgentRepository`] backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<Uuid, Agent>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentStore {
    async fn find_all(&self) -> Result<Vec<Agent>, StoreError> {
        let agents = self.agents.read().await;
        let mut all: Vec<Agent> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .find(|a| a.name == name)
            .cloned())
    }

    async fn create(&self, agent: Agent) -> Result<Agent, StoreError> {
        self.agents.write().await.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn update(&self, agent: Agent) -> Result<Agent, StoreError> {
        let mut agents = self.agents.write().await;
        if !agents.contains_key(&agent.id) {
            return Err(StoreError::NotFound(agent.id));
        }
        agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        agents.remove(&id).ok_or(StoreError::NotFound(id))?;
        Ok(())
    }
}

/// In-memory [`ConversationRepository`] keeping conversations and their logs
/// in two maps guarded by one lock, so a message append and its conversation
/// lookup observe a consistent snapshot.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<ConversationTables>,
}

#[derive(Default)]
struct ConversationTables {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<ChatMessage>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationStore {
    async fn find_all(&self) -> Result<Vec<Conversation>, StoreError> {
        let tables = self.inner.read().await;
        let mut all: Vec<Conversation> = tables.conversations.values().cloned().collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(all)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .conversations
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn create(&self, conversation: Conversation) -> Result<Conversation, StoreError> {
        let mut tables = self.inner.write().await;
        tables.messages.entry(conversation.id).or_default();
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn update(&self, conversation: Conversation) -> Result<Conversation, StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.conversations.contains_key(&conversation.id) {
            return Err(StoreError::NotFound(conversation.id));
        }
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn messages(&self, id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let tables = self.inner.read().await;
        tables
            .messages
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn add_message(&self, id: Uuid, message: ChatMessage) -> Result<ChatMessage, StoreError> {
        let mut tables = self.inner.write().await;
        let log = tables.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        log.push(message.clone());
        Ok(message)
    }
}
