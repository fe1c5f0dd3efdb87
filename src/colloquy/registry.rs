//! Agent registry: CRUD over agent records plus the reservation seam.
//!
//! The registry owns the only concurrency-sensitive shared resource in the
//! core: the boolean reservation flag on each agent. Conversation creation
//! must treat "read agent status, then flip to active" as atomic per agent;
//! [`AgentRegistry::reserve_all`] serializes the whole check-and-flip
//! sequence behind a registry-scoped mutex so that of two racing creation
//! attempts exactly one wins and the loser fails with `AgentNotAvailable`.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::colloquy::agent::{Agent, AgentKind, AgentStatus};
use crate::colloquy::store::{AgentRepository, StoreError};

/// Minimum accepted length of an agent name, after trimming.
pub const MIN_AGENT_NAME_LEN: usize = 2;

/// Errors surfaced by registry operations.
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// Another agent already uses the requested name (case-sensitive match).
    DuplicateName(String),

    /// Name or description failed validation.
    InvalidInput(String),

    /// No agent with the given id exists.
    NotFound(Uuid),

    /// The operation is illegal in the agent's current status
    /// (e.g. deleting a reserved agent).
    InvalidState(String),

    /// A reservation race was lost or the agent is already busy.
    AgentNotAvailable(String),

    /// The backing repository failed.
    Store(StoreError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => {
                write!(f, "Agent name already taken: {}", name)
            }
            RegistryError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            RegistryError::NotFound(id) => write!(f, "Agent not found: {}", id),
            RegistryError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            RegistryError::AgentNotAvailable(name) => {
                write!(f, "Agent not available: {}", name)
            }
            RegistryError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl Error for RegistryError {}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        RegistryError::Store(err)
    }
}

/// Owns agent records and their reservation status.
pub struct AgentRegistry {
    repository: Arc<dyn AgentRepository>,
    /// Serializes every check-and-reserve sequence. Held across the full
    /// read-validate-flip cycle of [`reserve_all`](AgentRegistry::reserve_all).
    reservation_lock: Mutex<()>,
}

impl AgentRegistry {
    pub fn new(repository: Arc<dyn AgentRepository>) -> Self {
        Self {
            repository,
            reservation_lock: Mutex::new(()),
        }
    }

    /// Register a new agent. New agents always start `Inactive`.
    pub async fn create(
        &self,
        name: impl Into<String>,
        kind: AgentKind,
        description: Option<String>,
    ) -> Result<Agent, RegistryError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.len() < MIN_AGENT_NAME_LEN {
            return Err(RegistryError::InvalidInput(format!(
                "agent name must be at least {} characters",
                MIN_AGENT_NAME_LEN
            )));
        }
        if self.repository.find_by_name(trimmed).await?.is_some() {
            return Err(RegistryError::DuplicateName(trimmed.to_string()));
        }

        let agent = Agent::new(trimmed, kind, description);
        let agent = self.repository.create(agent).await?;
        log::info!("Registered agent '{}' ({})", agent.name, agent.kind);
        Ok(agent)
    }

    /// Delete an agent. Legal only while the agent is `Inactive`.
    pub async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        let agent = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;
        if agent.status == AgentStatus::Active {
            return Err(RegistryError::InvalidState(format!(
                "agent '{}' is reserved by a conversation and cannot be deleted",
                agent.name
            )));
        }
        self.repository.delete(id).await?;
        log::info!("Deleted agent '{}'", agent.name);
        Ok(())
    }

    /// Administrative status override. Idempotent: a no-op if the agent is
    /// already in the requested status.
    pub async fn set_status(&self, id: Uuid, status: AgentStatus) -> Result<Agent, RegistryError> {
        let _guard = self.reservation_lock.lock().await;
        let mut agent = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;
        if agent.status == status {
            return Ok(agent);
        }
        agent.status = status;
        Ok(self.repository.update(agent).await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Agent>, RegistryError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Agent>, RegistryError> {
        Ok(self.repository.find_by_name(name).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Agent>, RegistryError> {
        Ok(self.repository.find_all().await?)
    }

    /// Atomically reserve every listed agent for a new conversation.
    ///
    /// All-or-nothing: if any id is unresolved (`NotFound`) or any agent is
    /// not currently `Inactive` (`AgentNotAvailable`), no agent is flipped.
    /// Returns the reserved agents in the order requested.
    pub async fn reserve_all(&self, ids: &[Uuid]) -> Result<Vec<Agent>, RegistryError> {
        let _guard = self.reservation_lock.lock().await;

        let mut agents = Vec::with_capacity(ids.len());
        for id in ids {
            let agent = self
                .repository
                .find_by_id(*id)
                .await?
                .ok_or(RegistryError::NotFound(*id))?;
            if agent.status != AgentStatus::Inactive {
                return Err(RegistryError::AgentNotAvailable(agent.name));
            }
            agents.push(agent);
        }

        let mut reserved = Vec::with_capacity(agents.len());
        for mut agent in agents {
            agent.status = AgentStatus::Active;
            reserved.push(self.repository.update(agent).await?);
        }
        Ok(reserved)
    }

    /// Release every listed agent back to `Inactive`. Best effort: an
    /// unresolved id is logged and skipped so the remaining agents are still
    /// released.
    pub async fn release_all(&self, ids: &[Uuid]) -> Result<(), RegistryError> {
        let _guard = self.reservation_lock.lock().await;

        for id in ids {
            match self.repository.find_by_id(*id).await? {
                Some(mut agent) => {
                    if agent.status != AgentStatus::Inactive {
                        agent.status = AgentStatus::Inactive;
                        self.repository.update(agent).await?;
                    }
                }
                None => {
                    log::warn!("release_all: agent {} no longer exists, skipping", id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colloquy::store::InMemoryAgentStore;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(InMemoryAgentStore::new()))
    }

    #[tokio::test]
    async fn create_validates_name() {
        let registry = registry();
        let err = registry
            .create("A", AgentKind::Learning, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));

        registry
            .create("Ada", AgentKind::Learning, None)
            .await
            .unwrap();
        let err = registry
            .create("Ada", AgentKind::Assistant, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn delete_rejects_reserved_agents() {
        let registry = registry();
        let agent = registry
            .create("Ada", AgentKind::Specialist, None)
            .await
            .unwrap();

        registry.reserve_all(&[agent.id]).await.unwrap();
        let err = registry.delete(agent.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState(_)));

        registry.release_all(&[agent.id]).await.unwrap();
        registry.delete(agent.id).await.unwrap();
    }

    #[tokio::test]
    async fn set_status_is_idempotent() {
        let registry = registry();
        let agent = registry
            .create("Ada", AgentKind::Assistant, None)
            .await
            .unwrap();

        let unchanged = registry
            .set_status(agent.id, AgentStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(unchanged.status, AgentStatus::Inactive);

        let flipped = registry
            .set_status(agent.id, AgentStatus::Active)
            .await
            .unwrap();
        assert_eq!(flipped.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn reserve_all_is_all_or_nothing() {
        let registry = registry();
        let free = registry
            .create("Free", AgentKind::Learning, None)
            .await
            .unwrap();
        let busy = registry
            .create("Busy", AgentKind::Assistant, None)
            .await
            .unwrap();
        registry.reserve_all(&[busy.id]).await.unwrap();

        let err = registry.reserve_all(&[free.id, busy.id]).await.unwrap_err();
        assert!(matches!(err, RegistryError::AgentNotAvailable(_)));

        // The free agent must not have been partially reserved.
        let agent = registry.find_by_id(free.id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Inactive);
    }

    #[tokio::test]
    async fn racing_reservations_have_one_winner() {
        let registry = Arc::new(registry());
        let sole = registry
            .create("Sole", AgentKind::Specialist, None)
            .await
            .unwrap();

        let a = {
            let registry = registry.clone();
            let id = sole.id;
            tokio::spawn(async move { registry.reserve_all(&[id]).await })
        };
        let b = {
            let registry = registry.clone();
            let id = sole.id;
            tokio::spawn(async move { registry.reserve_all(&[id]).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(
            loser.unwrap_err(),
            RegistryError::AgentNotAvailable(_)
        ));
    }
}
