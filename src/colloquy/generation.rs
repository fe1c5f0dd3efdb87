//! Generation driver: produces the next message for an active conversation
//! and periodically judges whether the stated goal has been met.
//!
//! The driver is constructed with an explicit handle to the text-generation
//! provider — there is no ambient global client. Constructed without a
//! client (e.g. missing credential) it runs in disabled mode: every
//! generation call is refused with [`GenerationError::ServiceDisabled`] and
//! [`GenerationDriver::status`] reports the reason. The driver also disables
//! itself process-wide after a configurable run of consecutive provider or
//! parse failures, leaving all conversation and agent state untouched.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::colloquy::agent::{AgentKind, StylePolicy};
use crate::colloquy::conversation::{ChatMessage, ConversationStatus, Recipients};
use crate::colloquy::lifecycle::{ConversationError, ConversationManager};

/// How many recent messages are replayed to the model per generation step.
const HISTORY_WINDOW: usize = 5;

/// How many recent messages are summarized for a goal-evaluation request.
const GOAL_WINDOW: usize = 10;

/// Disabled reason reported when the driver was built without a client.
const NO_CREDENTIAL_REASON: &str = "no generation credential configured";

/// Errors surfaced by generation steps.
#[derive(Debug)]
pub enum GenerationError {
    /// Generation was attempted while the driver is disabled.
    ServiceDisabled(String),

    /// The provider reply did not match the `"<AgentName>: <content>"` shape.
    MalformedResponse(String),

    /// The provider reply named a speaker outside the roster.
    UnknownSpeaker { name: String, valid: Vec<String> },

    /// The provider call itself failed.
    ProviderError(String),

    /// A participant of the conversation no longer resolves to an agent.
    /// Fatal for this step only, never for the process.
    AgentNotFound(Uuid),

    /// A lifecycle operation invoked by the driver failed.
    Conversation(ConversationError),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::ServiceDisabled(reason) => {
                write!(f, "Generation disabled: {}", reason)
            }
            GenerationError::MalformedResponse(raw) => write!(
                f,
                "Malformed response, expected \"<AgentName>: <content>\": {}",
                raw
            ),
            GenerationError::UnknownSpeaker { name, valid } => write!(
                f,
                "Unknown speaker '{}', valid speakers are: {}",
                name,
                valid.join(", ")
            ),
            GenerationError::ProviderError(msg) => write!(f, "Provider error: {}", msg),
            GenerationError::AgentNotFound(id) => write!(f, "Agent not found: {}", id),
            GenerationError::Conversation(err) => write!(f, "Conversation error: {}", err),
        }
    }
}

impl Error for GenerationError {}

impl From<ConversationError> for GenerationError {
    fn from(err: ConversationError) -> Self {
        GenerationError::Conversation(err)
    }
}

/// Process-wide AI availability, queryable at any time.
#[derive(Clone, Debug)]
pub struct AiStatus {
    pub enabled: bool,
    /// Human-readable reason when disabled.
    pub reason: Option<String>,
}

/// What one driver step did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// First message of the conversation was synthesized without a provider call.
    Opened,
    /// One generated message was appended.
    Advanced,
    /// The goal check judged the goal achieved; the conversation completed.
    GoalReached,
    /// The conversation is no longer active; nothing was done.
    Skipped,
}

/// Denormalized roster entry cached per conversation so every step does not
/// re-fetch agent records.
#[derive(Clone, Debug)]
struct RosterEntry {
    id: Uuid,
    name: String,
    kind: AgentKind,
    description: Option<String>,
    style: String,
}

/// Driver-private cached view of one conversation. Rebuilt lazily if absent,
/// discarded when the conversation is observed in a non-active state.
#[derive(Clone, Debug)]
struct ConversationContext {
    topic: String,
    goal: String,
    surrounding: String,
    roster: Vec<RosterEntry>,
    /// Running count driving the goal-check cadence.
    message_count: usize,
}

#[derive(Default)]
struct DriverState {
    consecutive_failures: usize,
    disabled_reason: Option<String>,
}

/// Converts conversation state into generation requests, parses the
/// structured replies, appends the resulting messages, and periodically
/// evaluates goal completion.
pub struct GenerationDriver {
    client: Option<Arc<dyn ClientWrapper>>,
    manager: Arc<ConversationManager>,
    style_policy: Arc<dyn StylePolicy>,
    /// Issue a goal-evaluation request every N appended messages.
    goal_check_every: usize,
    /// Self-disable after this many consecutive provider/parse failures.
    max_consecutive_failures: usize,
    contexts: AsyncMutex<HashMap<Uuid, ConversationContext>>,
    state: Mutex<DriverState>,
}

impl GenerationDriver {
    /// Create a driver with an explicit provider handle. Pass `None` to
    /// construct it in disabled mode (e.g. when no credential is configured).
    pub fn new(
        client: Option<Arc<dyn ClientWrapper>>,
        manager: Arc<ConversationManager>,
        style_policy: Arc<dyn StylePolicy>,
        goal_check_every: usize,
        max_consecutive_failures: usize,
    ) -> Self {
        let disabled_reason = if client.is_none() {
            Some(NO_CREDENTIAL_REASON.to_string())
        } else {
            None
        };
        Self {
            client,
            manager,
            style_policy,
            goal_check_every: goal_check_every.max(1),
            max_consecutive_failures: max_consecutive_failures.max(1),
            contexts: AsyncMutex::new(HashMap::new()),
            state: Mutex::new(DriverState {
                consecutive_failures: 0,
                disabled_reason,
            }),
        }
    }

    /// Current enabled/disabled state and reason. Never blocks on generation.
    pub fn status(&self) -> AiStatus {
        let state = self.state.lock().unwrap();
        AiStatus {
            enabled: state.disabled_reason.is_none(),
            reason: state.disabled_reason.clone(),
        }
    }

    /// Advance one conversation by one generation step.
    ///
    /// Provider and parse failures are folded into the consecutive-error
    /// counter; crossing the threshold disables the driver process-wide. Any
    /// successful step resets the counter.
    pub async fn step(&self, conversation_id: Uuid) -> Result<StepOutcome, GenerationError> {
        if let Some(reason) = self.disabled_reason() {
            return Err(GenerationError::ServiceDisabled(reason));
        }

        let result = self.step_inner(conversation_id).await;
        match &result {
            Ok(_) => self.record_success(),
            Err(
                err @ (GenerationError::MalformedResponse(_)
                | GenerationError::UnknownSpeaker { .. }
                | GenerationError::ProviderError(_)),
            ) => self.record_failure(err),
            // Lifecycle and lookup errors are surfaced to the caller but do
            // not count toward self-disabling.
            Err(_) => {}
        }
        result
    }

    async fn step_inner(&self, conversation_id: Uuid) -> Result<StepOutcome, GenerationError> {
        let conversation = self.manager.get(conversation_id).await?;
        if conversation.status != ConversationStatus::Active {
            self.contexts.lock().await.remove(&conversation_id);
            return Ok(StepOutcome::Skipped);
        }

        let context = match self.context_for(&conversation.id).await {
            Some(context) => context,
            None => {
                let built = self.build_context(&conversation).await?;
                self.contexts
                    .lock()
                    .await
                    .insert(conversation.id, built.clone());
                built
            }
        };

        let messages = self.manager.messages(conversation.id).await?;

        let outcome = if messages.is_empty() {
            self.bootstrap_opener(&conversation.id, &context).await?;
            StepOutcome::Opened
        } else {
            self.generate_next(&conversation.id, &context, &messages)
                .await?;
            StepOutcome::Advanced
        };

        let new_count = {
            let mut contexts = self.contexts.lock().await;
            match contexts.get_mut(&conversation.id) {
                Some(context) => {
                    context.message_count += 1;
                    context.message_count
                }
                None => context.message_count + 1,
            }
        };

        if new_count % self.goal_check_every == 0 {
            if self.evaluate_goal(&conversation.id, &context).await? {
                self.manager.complete(conversation.id, true).await?;
                self.contexts.lock().await.remove(&conversation.id);
                log::info!("Conversation '{}' reached its goal", conversation.name);
                return Ok(StepOutcome::GoalReached);
            }
        }

        Ok(outcome)
    }

    async fn context_for(&self, conversation_id: &Uuid) -> Option<ConversationContext> {
        self.contexts.lock().await.get(conversation_id).cloned()
    }

    /// Resolve all participants into a denormalized roster. A participant
    /// deleted out-of-band is fatal for this step, not for the process.
    async fn build_context(
        &self,
        conversation: &crate::colloquy::conversation::Conversation,
    ) -> Result<ConversationContext, GenerationError> {
        let registry = self.manager.registry();
        let mut roster = Vec::with_capacity(conversation.participants.len());
        for participant in &conversation.participants {
            let agent = registry
                .find_by_id(*participant)
                .await
                .map_err(|err| GenerationError::Conversation(err.into()))?
                .ok_or(GenerationError::AgentNotFound(*participant))?;
            let style = self.style_policy.style_for(&agent);
            roster.push(RosterEntry {
                id: agent.id,
                name: agent.name,
                kind: agent.kind,
                description: agent.description,
                style,
            });
        }

        let messages = self.manager.messages(conversation.id).await?;
        Ok(ConversationContext {
            topic: conversation.topic.clone(),
            goal: conversation.goal.clone(),
            surrounding: conversation.surrounding.clone(),
            roster,
            message_count: messages.len(),
        })
    }

    /// Synthesize the deterministic opening message from the first
    /// participant in roster order. No provider call is made.
    async fn bootstrap_opener(
        &self,
        conversation_id: &Uuid,
        context: &ConversationContext,
    ) -> Result<ChatMessage, GenerationError> {
        let opener = &context.roster[0];
        let mut content = format!("Hello everyone, I'm {}, a {} agent", opener.name, opener.kind);
        if let Some(description) = &opener.description {
            content.push_str(&format!(" ({})", description));
        }
        content.push_str(&format!(
            ". We're here to talk about {}. Our goal: {}. Let's begin.",
            context.topic, context.goal
        ));

        Ok(self
            .manager
            .add_message(*conversation_id, opener.id, content, Recipients::All)
            .await?)
    }

    /// One request/response cycle with the provider producing one new message.
    async fn generate_next(
        &self,
        conversation_id: &Uuid,
        context: &ConversationContext,
        messages: &[ChatMessage],
    ) -> Result<ChatMessage, GenerationError> {
        let client = self.client()?;

        let mut request = Vec::with_capacity(HISTORY_WINDOW + 1);
        request.push(Message {
            role: Role::System,
            content: self.system_instructions(context),
        });
        let window_start = messages.len().saturating_sub(HISTORY_WINDOW);
        for message in &messages[window_start..] {
            request.push(Message {
                role: Role::User,
                content: self.format_transcript_line(context, message),
            });
        }

        let reply = client
            .send_message(&request)
            .await
            .map_err(|err| GenerationError::ProviderError(err.to_string()))?;

        if let Some(usage) = client.get_last_usage() {
            log::debug!(
                "Generation step for {} used {} tokens ({} in / {} out)",
                conversation_id,
                usage.total_tokens,
                usage.input_tokens,
                usage.output_tokens
            );
        }

        let (speaker, content) = self.parse_reply(&reply.content, context)?;

        // The model only names sender and content; generated messages are
        // broadcast to the full roster.
        Ok(self
            .manager
            .add_message(*conversation_id, speaker, content, Recipients::All)
            .await?)
    }

    /// Ask the provider for a yes/no judgment of the goal against the most
    /// recent window of messages.
    async fn evaluate_goal(
        &self,
        conversation_id: &Uuid,
        context: &ConversationContext,
    ) -> Result<bool, GenerationError> {
        let client = self.client()?;
        let messages = self.manager.messages(*conversation_id).await?;
        let window_start = messages.len().saturating_sub(GOAL_WINDOW);
        let transcript: Vec<String> = messages[window_start..]
            .iter()
            .map(|m| self.format_transcript_line(context, m))
            .collect();

        let request = vec![
            Message {
                role: Role::System,
                content: "You judge whether a conversation has reached its stated goal. \
                          Answer with a single word: yes or no."
                    .to_string(),
            },
            Message {
                role: Role::User,
                content: format!(
                    "Goal: {}\n\nRecent conversation:\n{}\n\nHas the goal been reached?",
                    context.goal,
                    transcript.join("\n")
                ),
            },
        ];

        let reply = client
            .send_message(&request)
            .await
            .map_err(|err| GenerationError::ProviderError(err.to_string()))?;

        Ok(reply.content.to_lowercase().contains("yes"))
    }

    /// System-level instruction block derived from topic/goal/surrounding and
    /// each participant's archetype-driven communication style.
    fn system_instructions(&self, context: &ConversationContext) -> String {
        let mut instructions = format!(
            "You are simulating a multi-party conversation.\n\
             Topic: {}\n\
             Goal: {}\n\
             Setting: {}\n\n\
             Participants:\n",
            context.topic, context.goal, context.surrounding
        );
        for entry in &context.roster {
            instructions.push_str(&format!(
                "- {} ({} agent): {}\n",
                entry.name, entry.kind, entry.style
            ));
        }
        instructions.push_str(
            "\nContinue the conversation with exactly one message from one participant. \
             Reply in the form \"<AgentName>: <content>\" and nothing else.",
        );
        instructions
    }

    /// Render one stored message as a transcript line with explicit
    /// addressing context: `SenderName: content (to: recipient-list)`.
    fn format_transcript_line(&self, context: &ConversationContext, message: &ChatMessage) -> String {
        let sender = self.roster_name(context, &message.sender);
        let to = if message.recipients.len() == context.roster.len() {
            "all".to_string()
        } else {
            message
                .recipients
                .iter()
                .map(|id| self.roster_name(context, id))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{}: {} (to: {})", sender, message.content, to)
    }

    fn roster_name(&self, context: &ConversationContext, id: &Uuid) -> String {
        context
            .roster
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Parse a raw provider reply as `"<AgentName>: <content>"`.
    fn parse_reply(
        &self,
        raw: &str,
        context: &ConversationContext,
    ) -> Result<(Uuid, String), GenerationError> {
        let trimmed = raw.trim();
        let (name, content) = trimmed
            .split_once(':')
            .ok_or_else(|| GenerationError::MalformedResponse(trimmed.to_string()))?;
        let name = name.trim();
        let content = content.trim();
        if name.is_empty() || content.is_empty() {
            return Err(GenerationError::MalformedResponse(trimmed.to_string()));
        }

        match context.roster.iter().find(|entry| entry.name == name) {
            Some(entry) => Ok((entry.id, content.to_string())),
            None => Err(GenerationError::UnknownSpeaker {
                name: name.to_string(),
                valid: context.roster.iter().map(|e| e.name.clone()).collect(),
            }),
        }
    }

    fn client(&self) -> Result<Arc<dyn ClientWrapper>, GenerationError> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Err(GenerationError::ServiceDisabled(
                NO_CREDENTIAL_REASON.to_string(),
            )),
        }
    }

    fn disabled_reason(&self) -> Option<String> {
        self.state.lock().unwrap().disabled_reason.clone()
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures = 0;
    }

    fn record_failure(&self, err: &GenerationError) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures += 1;
        log::warn!(
            "Generation step failed ({}/{}): {}",
            state.consecutive_failures,
            self.max_consecutive_failures,
            err
        );
        if state.consecutive_failures >= self.max_consecutive_failures
            && state.disabled_reason.is_none()
        {
            let reason = format!(
                "disabled after {} consecutive generation failures; last error: {}",
                state.consecutive_failures, err
            );
            log::error!("Generation driver {}", reason);
            state.disabled_reason = Some(reason);
        }
    }
}
