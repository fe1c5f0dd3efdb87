//! # Colloquy
//!
//! Colloquy is a Rust toolkit for orchestrating goal-directed, multi-party
//! text conversations between simulated agents, driven by a remote Large
//! Language Model backend.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Agents**: simulated participants with a behavioral archetype
//!   ([`AgentKind`](agent::AgentKind)), a free-form persona description, and
//!   a busy/free reservation flag managed by the [`AgentRegistry`]
//! * **Conversations**: bounded multi-party exchanges with a topic, goal,
//!   and narrative setting, advanced one message at a time through an
//!   explicit lifecycle state machine ([`ConversationManager`])
//! * **Generation**: a [`GenerationDriver`] that turns conversation state
//!   into provider requests, parses the structured replies, and periodically
//!   judges whether the stated goal has been reached
//! * **Scheduling**: a [`ConversationScheduler`] running a recurring,
//!   non-overlapping background sweep that advances every eligible
//!   conversation while rate-limiting each one individually
//! * **Provider Flexibility**: the [`ClientWrapper`] trait decouples the
//!   core from any specific vendor; an OpenAI-compatible client ships in
//!   [`clients::openai`]
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use colloquy::agent::{AgentKind, ArchetypeStylePolicy};
//! use colloquy::clients::openai::OpenAIClient;
//! use colloquy::config::ColloquyConfig;
//! use colloquy::store::{InMemoryAgentStore, InMemoryConversationStore};
//! use colloquy::{AgentRegistry, ConversationManager, ConversationScheduler, GenerationDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     colloquy::init_logger();
//!
//!     let config = ColloquyConfig::from_env()?;
//!     let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryAgentStore::new())));
//!     let manager = Arc::new(ConversationManager::new(
//!         Arc::new(InMemoryConversationStore::new()),
//!         registry.clone(),
//!     ));
//!
//!     let alice = registry.create("Alice", AgentKind::Learning, None).await?;
//!     let bob = registry
//!         .create("Bob", AgentKind::Assistant, Some("A friendly planner".into()))
//!         .await?;
//!
//!     let conversation = manager
//!         .create(
//!             "trip",
//!             "planning a weekend trip",
//!             "agree on a destination",
//!             "a quiet coffee shop",
//!             vec![alice.id, bob.id],
//!         )
//!         .await?;
//!
//!     // Absent credential the driver constructs disabled; conversations can
//!     // still be managed manually.
//!     let client = config.api_key.as_deref().map(|key| {
//!         Arc::new(OpenAIClient::new_with_model_string(key, &config.model))
//!             as Arc<dyn colloquy::ClientWrapper>
//!     });
//!     let driver = Arc::new(GenerationDriver::new(
//!         client,
//!         manager.clone(),
//!         Arc::new(ArchetypeStylePolicy),
//!         config.goal_check_every,
//!         config.max_consecutive_failures,
//!     ));
//!
//!     let scheduler = Arc::new(ConversationScheduler::new(
//!         manager.clone(),
//!         driver.clone(),
//!         config.scheduler_config(),
//!     ));
//!     let handle = scheduler.clone().start();
//!
//!     // ... let the conversation run ...
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!
//!     scheduler.stop(handle).await;
//!     println!("{:?}", manager.messages(conversation.id).await?);
//!     Ok(())
//! }
//! ```
//!
//! Continue exploring the modules re-exported from the crate root for the
//! full lifecycle, scheduling, and provider surfaces.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// The helper is intentionally lightweight so that applications embedding
/// colloquy can opt in to simple `RUST_LOG` driven diagnostics without having
/// to choose a specific logging backend upfront.
///
/// ```rust
/// colloquy::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `colloquy` module.
pub mod colloquy;

// Re-exporting key items for easier external access.
pub use colloquy::agent;
pub use colloquy::agent::{Agent, AgentKind, AgentStatus, ArchetypeStylePolicy, StylePolicy};
pub use colloquy::client_wrapper;
pub use colloquy::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use colloquy::clients;
pub use colloquy::config;
pub use colloquy::config::ColloquyConfig;
pub use colloquy::conversation;
pub use colloquy::conversation::{
    ChatMessage, Conversation, ConversationStatus, Recipients, MAX_PARTICIPANTS, MIN_PARTICIPANTS,
};
pub use colloquy::generation;
pub use colloquy::generation::{AiStatus, GenerationDriver, GenerationError, StepOutcome};
pub use colloquy::lifecycle;
pub use colloquy::lifecycle::{ConversationError, ConversationManager, ConversationStatistics};
pub use colloquy::registry;
pub use colloquy::registry::{AgentRegistry, RegistryError};
pub use colloquy::scheduler;
pub use colloquy::scheduler::{ConversationScheduler, SchedulerConfig};
pub use colloquy::store;
pub use colloquy::store::{
    AgentRepository, ConversationRepository, InMemoryAgentStore, InMemoryConversationStore,
    StoreError,
};
