// Integration tests for multi-agent conversation orchestration
use async_trait::async_trait;
use koinonia::client_wrapper::{GenerationRequest, GenerationResponse, SendError, TextGenClient};
use koinonia::conversation_store::{
    ConversationStore, InMemoryConversationStore, SenderKind, StoredMessage,
};
use koinonia::{AgentParticipant, KoinoniaConfig, MultiAgentConversation};
use std::sync::{Arc, Mutex};

// Mock client that records every request and fails whenever the outgoing
// system instruction mentions a configured marker string.
struct ScriptedClient {
    calls: Mutex<Vec<GenerationRequest>>,
    fail_when_contains: Mutex<Option<String>>,
}

impl ScriptedClient {
    fn new() -> Self {
        ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_when_contains: Mutex::new(None),
        }
    }

    fn failing_for(marker: &str) -> Self {
        ScriptedClient {
            calls: Mutex::new(Vec::new()),
            fail_when_contains: Mutex::new(Some(marker.to_string())),
        }
    }

    fn clear_failure(&self) {
        *self.fail_when_contains.lock().unwrap() = None;
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_request(&self) -> GenerationRequest {
        self.calls.lock().unwrap().last().unwrap().clone()
    }
}

#[async_trait]
impl TextGenClient for ScriptedClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, SendError> {
        let marker = self.fail_when_contains.lock().unwrap().clone();
        let should_fail = marker
            .map(|m| request.messages.iter().any(|msg| msg.content.contains(&m)))
            .unwrap_or(false);
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request);
            calls.len()
        };
        if should_fail {
            return Ok(GenerationResponse {
                error: Some("service unavailable".to_string()),
                ..Default::default()
            });
        }
        Ok(GenerationResponse::with_text(format!("reply {}", index)))
    }
}

// Store whose appends always fail, for persistence-failure paths.
struct BrokenStore;

#[async_trait]
impl ConversationStore for BrokenStore {
    async fn append(
        &self,
        _conversation_id: &str,
        _message: StoredMessage,
    ) -> Result<(), SendError> {
        Err("disk full".into())
    }

    async fn read_all(&self, _conversation_id: &str) -> Result<Vec<StoredMessage>, SendError> {
        Err("disk full".into())
    }
}

fn participant(id: &str, name: &str) -> AgentParticipant {
    AgentParticipant {
        id: id.to_string(),
        display_name: name.to_string(),
        kind: "advisor".to_string(),
        persona_template: format!("{} persona for the roundtable.", name),
        description: "A test participant.".to_string(),
    }
}

fn conversation_with(
    client: Arc<ScriptedClient>,
    store: Arc<dyn ConversationStore>,
) -> MultiAgentConversation {
    let mut conversation =
        MultiAgentConversation::new(client, store, KoinoniaConfig::default());
    conversation.set_conversation(Some("conv-1".to_string()));
    conversation
}

#[tokio::test]
async fn test_initialization_runs_each_agent_exactly_once() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store.clone());

    conversation.add_participants(vec![
        participant("elder", "Elder Ruth"),
        participant("deacon", "Deacon Sam"),
    ]);
    conversation.mark_reference_empty();

    let first = conversation.initialize_agents().await.unwrap();
    assert_eq!(first, 2, "Both agents should initialize on the first pass");
    assert_eq!(client.call_count(), 2);

    let second = conversation.initialize_agents().await.unwrap();
    assert_eq!(second, 0, "A second pass must not repeat the exchanges");
    assert_eq!(client.call_count(), 2, "No further API calls expected");

    assert_eq!(conversation.messages().len(), 2);
    assert_eq!(store.len("conv-1"), 2);
    assert!(conversation.initialized_agents().contains("elder"));
    assert!(conversation.initialized_agents().contains("deacon"));
}

#[tokio::test]
async fn test_initialization_waits_for_reference_fetch() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store);

    conversation.add_participants(vec![participant("elder", "Elder Ruth")]);

    // Reference still NotFetched: the pass must be skipped, not fail.
    let initialized = conversation.initialize_agents().await.unwrap();
    assert_eq!(initialized, 0);
    assert_eq!(client.call_count(), 0, "Must not call the API before the reference loads");

    conversation.set_reference_content("The discernment plan text.");
    let initialized = conversation.initialize_agents().await.unwrap();
    assert_eq!(initialized, 1);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_failed_agent_stays_pending_and_is_retried() {
    let client = Arc::new(ScriptedClient::failing_for("Deacon Sam"));
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store);

    conversation.add_participants(vec![
        participant("elder", "Elder Ruth"),
        participant("deacon", "Deacon Sam"),
    ]);
    conversation.mark_reference_empty();

    let first = conversation.initialize_agents().await.unwrap();
    assert_eq!(first, 1, "Only the healthy agent should complete");
    assert!(conversation.initialized_agents().contains("elder"));
    assert!(!conversation.initialized_agents().contains("deacon"));

    let notices = conversation.drain_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].title.contains("Deacon Sam"));

    // Service recovers: the next pass retries only the failed agent.
    client.clear_failure();
    let second = conversation.initialize_agents().await.unwrap();
    assert_eq!(second, 1);
    assert_eq!(client.call_count(), 3, "Elder must not be re-initialized");
    assert!(conversation.initialized_agents().contains("deacon"));
}

#[tokio::test]
async fn test_broadcast_replies_land_in_participant_order() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store.clone());

    conversation.add_participants(vec![
        participant("elder", "Elder Ruth"),
        participant("deacon", "Deacon Sam"),
    ]);
    conversation.mark_reference_empty();
    conversation.initialize_agents().await.unwrap();

    conversation
        .send_message_to_agents("What should we try first?")
        .await
        .unwrap();

    // Two intros, then user turn, then one reply per agent in roster order.
    let messages = conversation.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[2].sender_kind, SenderKind::User);
    assert_eq!(messages[3].agent_id.as_deref(), Some("elder"));
    assert_eq!(messages[4].agent_id.as_deref(), Some("deacon"));
    assert_eq!(store.len("conv-1"), 5);
}

#[tokio::test]
async fn test_same_turn_sibling_replies_are_not_visible() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store);

    conversation.add_participants(vec![
        participant("elder", "Elder Ruth"),
        participant("deacon", "Deacon Sam"),
    ]);
    conversation.mark_reference_empty();
    conversation.initialize_agents().await.unwrap();

    conversation
        .send_message_to_agents("What should we try first?")
        .await
        .unwrap();

    // Elder's same-turn reply is call 3 ("reply 3"); Deacon's request is the
    // fourth call and must see the history only up to the user turn.
    let requests = client.calls.lock().unwrap();
    let deacon_request = &requests[3];
    assert_eq!(
        deacon_request.messages.len(),
        4,
        "system, two intros, and the user turn only"
    );
    assert!(
        deacon_request
            .messages
            .iter()
            .all(|m| !m.content.contains("reply 3")),
        "second agent must not see the first agent's same-turn reply"
    );
}

#[tokio::test]
async fn test_one_failing_agent_does_not_halt_siblings() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store);

    conversation.add_participants(vec![
        participant("elder", "Elder Ruth"),
        participant("deacon", "Deacon Sam"),
    ]);
    conversation.mark_reference_empty();
    conversation.initialize_agents().await.unwrap();

    // Fail only the persona that mentions Deacon Sam from here on.
    *client.fail_when_contains.lock().unwrap() = Some("Deacon Sam".to_string());
    conversation
        .send_message_to_agents("Thoughts on the budget?")
        .await
        .unwrap();

    let messages = conversation.messages();
    let deacon_reply = messages
        .iter()
        .find(|m| m.agent_id.as_deref() == Some("deacon") && m.content.starts_with("Error:"))
        .expect("failed agent should contribute an error-reply message");
    assert!(deacon_reply.content.contains("Deacon Sam"));

    let elder_replied = messages
        .iter()
        .any(|m| m.agent_id.as_deref() == Some("elder") && m.content.starts_with("reply"));
    assert!(elder_replied, "Healthy agent must still reply");

    let notices = conversation.drain_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].title.contains("Deacon Sam"));
}

#[tokio::test]
async fn test_user_message_store_failure_aborts_turn() {
    let client = Arc::new(ScriptedClient::new());
    let mut conversation = conversation_with(client.clone(), Arc::new(BrokenStore));

    conversation.add_participants(vec![participant("elder", "Elder Ruth")]);
    conversation.mark_reference_empty();

    let result = conversation.send_message_to_agents("Hello?").await;
    assert!(result.is_err(), "Persistence failure must abort the turn");
    assert_eq!(client.call_count(), 0, "No agent should be consulted");
    assert_eq!(
        conversation.messages().len(),
        1,
        "The in-memory user message is not rolled back"
    );
    assert!(!conversation.is_busy());
}

#[tokio::test]
async fn test_ledgers_are_scoped_per_conversation() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store.clone());

    conversation.add_participants(vec![participant("elder", "Elder Ruth")]);
    conversation.mark_reference_empty();
    conversation.initialize_agents().await.unwrap();
    assert_eq!(client.call_count(), 1);

    // Same id again: no reset, no re-initialization.
    conversation.set_conversation(Some("conv-1".to_string()));
    conversation.initialize_agents().await.unwrap();
    assert_eq!(client.call_count(), 1);

    // New id: fresh ledger, the agent is introduced there too.
    conversation.set_conversation(Some("conv-2".to_string()));
    assert!(conversation.messages().is_empty());
    conversation.initialize_agents().await.unwrap();
    assert_eq!(client.call_count(), 2);

    // Back to the first conversation: its ledger survived the round trip,
    // so the introductory exchange is not repeated.
    conversation.set_conversation(Some("conv-1".to_string()));
    conversation.initialize_agents().await.unwrap();
    assert_eq!(client.call_count(), 2);
    assert_eq!(store.len("conv-1"), 1, "Exactly one intro stored for conv-1");
}

#[tokio::test]
async fn test_load_history_restores_stored_messages() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client, store.clone());

    store
        .append(
            "conv-1",
            koinonia::ConversationMessage::user("conv-1", "Earlier question").to_stored(),
        )
        .await
        .unwrap();
    store
        .append(
            "conv-1",
            koinonia::ConversationMessage::agent("conv-1", "elder", "Earlier answer").to_stored(),
        )
        .await
        .unwrap();

    conversation.load_history().await.unwrap();

    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "Earlier question");
    assert_eq!(messages[1].agent_id.as_deref(), Some("elder"));
    assert_eq!(messages[1].conversation_id, "conv-1");
}

#[tokio::test]
async fn test_persona_receives_reference_content() {
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let mut conversation = conversation_with(client.clone(), store);

    conversation.add_participants(vec![AgentParticipant {
        id: "elder".to_string(),
        display_name: "Elder Ruth".to_string(),
        kind: "advisor".to_string(),
        persona_template: "Grounded in the plan: $(discernment_plan_details)".to_string(),
        description: "A test participant.".to_string(),
    }]);
    conversation.set_reference_content("Repurpose the fellowship hall.");
    conversation.initialize_agents().await.unwrap();

    let request = client.last_request();
    let system = &request.messages[0].content;
    assert!(
        system.contains("Repurpose the fellowship hall."),
        "Reference content should be substituted into the persona: {}",
        system
    );
}
