// src/colloquy/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod conversation;
pub mod generation;
pub mod lifecycle;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use generation::GenerationDriver;
pub use lifecycle::ConversationManager;
pub use registry::AgentRegistry;
pub use scheduler::ConversationScheduler;
