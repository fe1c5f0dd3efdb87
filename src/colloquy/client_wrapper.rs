use async_trait::async_trait;
use std::error::Error;
use std::sync::Mutex;

/// A ClientWrapper is a wrapper around a specific text-generation service.
/// It provides a common interface to request one completion at a time.
/// It does not keep track of any conversation; the generation driver owns
/// per-conversation context and uses a ClientWrapper purely as a
/// request/response boundary.

/// Represents the possible roles for a message sent to the provider.
#[derive(Clone, Debug)]
pub enum Role {
    /// Set by the library to steer the model's responses.
    System,
    /// Transcript lines attributed to conversation participants.
    User,
    /// Content previously generated by the model itself.
    Assistant,
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// A generic message to be sent to (or received from) the provider.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

/// Type alias for the error boxed across the provider boundary.
pub type ProviderBoxError = Box<dyn Error + Send + Sync>;

/// Trait defining the interface to interact with text-generation services.
///
/// Requests are synchronous request/response: an ordered list of role-tagged
/// messages in, a single assistant message out. No streaming.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the given messages to the provider and return its reply.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ProviderBoxError>;

    /// Identifier of the underlying model, for logging.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl returns None so wrappers without accounting don't break.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    /// Implementations that track usage should return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
