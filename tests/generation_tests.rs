use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use colloquy::agent::{AgentKind, AgentStatus, ArchetypeStylePolicy};
use colloquy::client_wrapper::{ClientWrapper, Message, Role};
use colloquy::conversation::ConversationStatus;
use colloquy::generation::{GenerationError, StepOutcome};
use colloquy::store::{InMemoryAgentStore, InMemoryConversationStore};
use colloquy::{AgentRegistry, ConversationManager, GenerationDriver};
use uuid::Uuid;

/// Scripted provider: pops one canned reply per call, errors when exhausted
/// so an unexpected provider round-trip fails the test.
struct MockClient {
    replies: Mutex<VecDeque<String>>,
}

impl MockClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(content) => Ok(Message {
                role: Role::Assistant,
                content,
            }),
            None => Err("mock client exhausted".into()),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

struct Fixture {
    manager: Arc<ConversationManager>,
    alice: Uuid,
    bob: Uuid,
    conversation: Uuid,
}

async fn fixture() -> Fixture {
    let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryAgentStore::new())));
    let manager = Arc::new(ConversationManager::new(
        Arc::new(InMemoryConversationStore::new()),
        registry,
    ));
    let alice = manager
        .registry()
        .create("Alice", AgentKind::Learning, None)
        .await
        .unwrap();
    let bob = manager
        .registry()
        .create("Bob", AgentKind::Assistant, Some("friendly".into()))
        .await
        .unwrap();
    let conversation = manager
        .create(
            "budget",
            "next year's budget",
            "agree on X",
            "a meeting room",
            vec![alice.id, bob.id],
        )
        .await
        .unwrap();
    Fixture {
        manager,
        alice: alice.id,
        bob: bob.id,
        conversation: conversation.id,
    }
}

fn driver(
    fixture: &Fixture,
    client: Option<Arc<dyn ClientWrapper>>,
    goal_check_every: usize,
    max_failures: usize,
) -> GenerationDriver {
    GenerationDriver::new(
        client,
        fixture.manager.clone(),
        Arc::new(ArchetypeStylePolicy),
        goal_check_every,
        max_failures,
    )
}

#[tokio::test]
async fn first_step_synthesizes_opener_without_provider_call() {
    let fixture = fixture().await;
    // An exhausted mock: any provider round-trip would error the step.
    let driver = driver(&fixture, Some(MockClient::new(&[])), 100, 3);

    let outcome = driver.step(fixture.conversation).await.unwrap();
    assert_eq!(outcome, StepOutcome::Opened);

    let messages = fixture.manager.messages(fixture.conversation).await.unwrap();
    assert_eq!(messages.len(), 1);
    let opener = &messages[0];
    assert_eq!(opener.sender, fixture.alice);
    assert_eq!(opener.recipients, vec![fixture.alice, fixture.bob]);
    assert!(opener.content.contains("Alice"));
    assert!(opener.content.contains("learning"));
    assert!(opener.content.contains("next year's budget"));
    assert!(opener.content.contains("agree on X"));
}

#[tokio::test]
async fn generated_replies_are_parsed_and_broadcast() {
    let fixture = fixture().await;
    let driver = driver(
        &fixture,
        Some(MockClient::new(&["Bob: Sounds reasonable to me."])),
        100,
        3,
    );

    driver.step(fixture.conversation).await.unwrap(); // opener
    let outcome = driver.step(fixture.conversation).await.unwrap();
    assert_eq!(outcome, StepOutcome::Advanced);

    let messages = fixture.manager.messages(fixture.conversation).await.unwrap();
    assert_eq!(messages.len(), 2);
    let reply = &messages[1];
    assert_eq!(reply.sender, fixture.bob);
    assert_eq!(reply.content, "Sounds reasonable to me.");
    assert_eq!(reply.recipients, vec![fixture.alice, fixture.bob]);
}

#[tokio::test]
async fn affirmative_goal_check_completes_the_conversation() {
    let fixture = fixture().await;
    // Every 2nd message triggers a goal check; the second canned reply is
    // the judgment.
    let driver = driver(
        &fixture,
        Some(MockClient::new(&["Bob: I agree to X.", "Yes, it has."])),
        2,
        3,
    );

    assert_eq!(
        driver.step(fixture.conversation).await.unwrap(),
        StepOutcome::Opened
    );
    assert_eq!(
        driver.step(fixture.conversation).await.unwrap(),
        StepOutcome::GoalReached
    );

    let conversation = fixture.manager.get(fixture.conversation).await.unwrap();
    assert_eq!(conversation.status, ConversationStatus::Completed);
    assert_eq!(conversation.goal_achieved, Some(true));
    assert!(conversation.ended_at.is_some());

    for agent in [fixture.alice, fixture.bob] {
        let status = fixture
            .manager
            .registry()
            .find_by_id(agent)
            .await
            .unwrap()
            .unwrap()
            .status;
        assert_eq!(status, AgentStatus::Inactive);
    }
}

#[tokio::test]
async fn negative_goal_check_keeps_the_conversation_running() {
    let fixture = fixture().await;
    let driver = driver(
        &fixture,
        Some(MockClient::new(&["Bob: Still discussing.", "no"])),
        2,
        3,
    );

    driver.step(fixture.conversation).await.unwrap();
    assert_eq!(
        driver.step(fixture.conversation).await.unwrap(),
        StepOutcome::Advanced
    );
    let conversation = fixture.manager.get(fixture.conversation).await.unwrap();
    assert_eq!(conversation.status, ConversationStatus::Active);
    assert_eq!(conversation.goal_achieved, None);
}

#[tokio::test]
async fn malformed_reply_leaves_conversation_untouched() {
    let fixture = fixture().await;
    let driver = driver(
        &fixture,
        Some(MockClient::new(&["a reply with no speaker prefix"])),
        100,
        3,
    );

    driver.step(fixture.conversation).await.unwrap(); // opener
    let err = driver.step(fixture.conversation).await.unwrap_err();
    assert!(matches!(err, GenerationError::MalformedResponse(_)));

    let messages = fixture.manager.messages(fixture.conversation).await.unwrap();
    assert_eq!(messages.len(), 1);
    let conversation = fixture.manager.get(fixture.conversation).await.unwrap();
    assert_eq!(conversation.status, ConversationStatus::Active);
    assert!(driver.status().enabled);
}

#[tokio::test]
async fn unknown_speaker_error_enumerates_valid_names() {
    let fixture = fixture().await;
    let driver = driver(&fixture, Some(MockClient::new(&["Zed: hello there"])), 100, 3);

    driver.step(fixture.conversation).await.unwrap(); // opener
    let err = driver.step(fixture.conversation).await.unwrap_err();
    match &err {
        GenerationError::UnknownSpeaker { name, valid } => {
            assert_eq!(name, "Zed");
            assert_eq!(valid, &vec!["Alice".to_string(), "Bob".to_string()]);
        }
        other => panic!("expected UnknownSpeaker, got {}", other),
    }
    let display = err.to_string();
    assert!(display.contains("Alice"));
    assert!(display.contains("Bob"));
}

#[tokio::test]
async fn consecutive_failures_disable_the_driver() {
    let fixture = fixture().await;
    let driver = driver(
        &fixture,
        Some(MockClient::new(&["garbage one", "garbage two"])),
        100,
        2,
    );

    driver.step(fixture.conversation).await.unwrap(); // opener
    assert!(driver.step(fixture.conversation).await.is_err());
    assert!(driver.status().enabled);
    assert!(driver.step(fixture.conversation).await.is_err());

    let status = driver.status();
    assert!(!status.enabled);
    let reason = status.reason.unwrap();
    assert!(reason.contains("2 consecutive"));

    // Once disabled, further steps are refused without provider calls.
    let err = driver.step(fixture.conversation).await.unwrap_err();
    assert!(matches!(err, GenerationError::ServiceDisabled(_)));
}

#[tokio::test]
async fn a_successful_step_resets_the_failure_counter() {
    let fixture = fixture().await;
    let driver = driver(
        &fixture,
        Some(MockClient::new(&["garbage", "Bob: recovered", "garbage again"])),
        100,
        2,
    );

    driver.step(fixture.conversation).await.unwrap(); // opener
    assert!(driver.step(fixture.conversation).await.is_err()); // 1st failure
    driver.step(fixture.conversation).await.unwrap(); // success resets
    assert!(driver.step(fixture.conversation).await.is_err()); // 1st again

    assert!(driver.status().enabled);
}

#[tokio::test]
async fn driver_without_credential_is_disabled_but_queryable() {
    let fixture = fixture().await;
    let driver = driver(&fixture, None, 100, 3);

    let status = driver.status();
    assert!(!status.enabled);
    assert!(status.reason.unwrap().contains("credential"));

    let err = driver.step(fixture.conversation).await.unwrap_err();
    assert!(matches!(err, GenerationError::ServiceDisabled(_)));

    // Disabled AI never blocks manual conversation management.
    fixture
        .manager
        .add_message(
            fixture.conversation,
            fixture.alice,
            "typed by hand",
            colloquy::Recipients::All,
        )
        .await
        .unwrap();
    fixture.manager.pause(fixture.conversation).await.unwrap();
}

#[tokio::test]
async fn steps_on_inactive_conversations_are_skipped() {
    let fixture = fixture().await;
    let driver = driver(&fixture, Some(MockClient::new(&[])), 100, 3);

    fixture.manager.pause(fixture.conversation).await.unwrap();
    assert_eq!(
        driver.step(fixture.conversation).await.unwrap(),
        StepOutcome::Skipped
    );

    fixture.manager.unpause(fixture.conversation).await.unwrap();
    fixture.manager.terminate(fixture.conversation).await.unwrap();
    assert_eq!(
        driver.step(fixture.conversation).await.unwrap(),
        StepOutcome::Skipped
    );
    assert_eq!(
        fixture
            .manager
            .messages(fixture.conversation)
            .await
            .unwrap()
            .len(),
        0
    );
}

#[tokio::test]
async fn step_fails_per_conversation_if_a_participant_was_deleted() {
    // Deleting a reserved agent is rejected by the registry, so simulate the
    // out-of-band case through an administrative release first.
    let fixture = fixture().await;
    let driver = driver(&fixture, Some(MockClient::new(&[])), 100, 3);

    fixture
        .manager
        .registry()
        .set_status(fixture.bob, AgentStatus::Inactive)
        .await
        .unwrap();
    fixture.manager.registry().delete(fixture.bob).await.unwrap();

    let err = driver.step(fixture.conversation).await.unwrap_err();
    assert!(matches!(err, GenerationError::AgentNotFound(id) if id == fixture.bob));
    // Fatal for the step, not the process.
    assert!(driver.status().enabled);
}
