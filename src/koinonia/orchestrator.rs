//! Multi-agent conversation orchestration.
//!
//! A [`MultiAgentConversation`] owns the set of participant agents for one
//! conversation, initializes each agent exactly once per conversation
//! lifetime, broadcasts every new user message to each participant
//! sequentially, and aggregates the resulting messages in display order.
//!
//! The central correctness invariant is the initialization ledger: an agent
//! id is recorded if and only if its one-time introductory exchange completed
//! without error, so rapid re-triggers cannot duplicate the exchange and a
//! failed agent is retried on a later pass. All per-conversation state lives
//! on the session object itself rather than in module-level singletons, which
//! keeps the lock and reset semantics explicit and testable.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use koinonia::clients::openai::OpenAIClient;
//! use koinonia::conversation_store::InMemoryConversationStore;
//! use koinonia::{AgentParticipant, KoinoniaConfig, MultiAgentConversation};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(OpenAIClient::new("api_key", "gpt-4o-mini"));
//! let store = Arc::new(InMemoryConversationStore::new());
//!
//! let mut conversation =
//!     MultiAgentConversation::new(client, store, KoinoniaConfig::default());
//! conversation.set_conversation(Some("conv-1".to_string()));
//! conversation.add_participants(vec![AgentParticipant {
//!     id: "deacon".into(),
//!     display_name: "Deacon Sam".into(),
//!     kind: "deacon".into(),
//!     persona_template: "Practical and budget-minded.".into(),
//!     description: "Keeps the lights on.".into(),
//! }]);
//! conversation.mark_reference_empty();
//!
//! conversation.initialize_agents().await?;
//! conversation.send_message_to_agents("What should we try first?").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::koinonia::client_wrapper::TextGenClient;
use crate::koinonia::config::KoinoniaConfig;
use crate::koinonia::conversation_store::{ConversationMessage, ConversationStore};
use crate::koinonia::responder::{AgentParticipant, SingleAgentResponder, TurnKind};

/// Scripted first user line sent to every newly joined agent.
pub const INTRODUCTORY_USER_LINE: &str = "I have opinions about this process and \
    discerning the repurposing process for designing sustainable ministries. \
    Where do you want to start?";

/// Placeholder name persona templates use to reference the shared plan text.
pub const REFERENCE_PLACEHOLDER: &str = "discernment_plan_details";

/// Load state of the contextual reference block that persona templates may
/// embed.
///
/// A tri-state rather than a boolean so that "no content found" is
/// distinguishable from "still loading": initialization passes refuse to run
/// until the reference has been fetched, but run fine when the fetch found
/// nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceContent {
    /// Not yet fetched; initialization must wait.
    NotFetched,
    /// Fetched, nothing found.
    Empty,
    /// Fetched with content.
    Loaded(String),
}

impl ReferenceContent {
    pub fn is_fetched(&self) -> bool {
        !matches!(self, ReferenceContent::NotFetched)
    }
}

/// A non-fatal user-visible notice, e.g. one agent's introductory exchange
/// failing while the others proceed.
#[derive(Clone, Debug)]
pub struct Notice {
    pub title: String,
    pub detail: String,
}

/// Fatal orchestrator failures.
#[derive(Debug)]
pub enum OrchestratorError {
    /// An operation that needs a conversation id ran before one was set.
    NoConversation,
    /// The conversation store rejected a write; in-memory state is not
    /// rolled back, so the UI may show a message that failed to persist.
    StoreWrite(String),
    /// Reading the conversation's stored history failed.
    HistoryLoad(String),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::NoConversation => write!(f, "No conversation selected"),
            OrchestratorError::StoreWrite(msg) => {
                write!(f, "Could not save message to conversation history: {}", msg)
            }
            OrchestratorError::HistoryLoad(msg) => {
                write!(f, "Could not load previous messages: {}", msg)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {}

/// Orchestrates one multi-agent conversation.
pub struct MultiAgentConversation {
    responder: SingleAgentResponder,
    store: Arc<dyn ConversationStore>,
    conversation_id: Option<String>,
    participants: Vec<AgentParticipant>,
    messages: Vec<ConversationMessage>,
    /// Per-conversation ledgers of agent ids whose introductory exchange
    /// completed without error. Kept across conversation switches so that
    /// returning to an earlier conversation does not repeat its exchanges.
    ledgers: HashMap<String, HashSet<String>>,
    /// Re-entrancy guard: a new initialization pass may not start while one
    /// is in flight. Under cooperative scheduling a flag suffices; the
    /// exclusive borrow on `self` rules out true concurrent mutation.
    initializing: bool,
    busy: bool,
    reference: ReferenceContent,
    notices: Vec<Notice>,
}

impl MultiAgentConversation {
    pub fn new(
        client: Arc<dyn TextGenClient>,
        store: Arc<dyn ConversationStore>,
        config: KoinoniaConfig,
    ) -> Self {
        MultiAgentConversation {
            responder: SingleAgentResponder::new(client, &config),
            store,
            conversation_id: None,
            participants: Vec::new(),
            messages: Vec::new(),
            ledgers: HashMap::new(),
            initializing: false,
            busy: false,
            reference: ReferenceContent::NotFetched,
            notices: Vec::new(),
        }
    }

    /// Switch to `conversation_id`.
    ///
    /// Changing ids resets the in-memory message list. Each conversation's
    /// initialization ledger survives the switch, so moving away and back
    /// does not repeat introductory exchanges; reload the log with
    /// [`load_history`](Self::load_history) after switching.
    pub fn set_conversation(&mut self, conversation_id: Option<String>) {
        if self.conversation_id == conversation_id {
            return;
        }
        log::info!(
            "MultiAgentConversation: switching conversation {:?} -> {:?}",
            self.conversation_id,
            conversation_id
        );
        self.conversation_id = conversation_id;
        self.messages.clear();
    }

    /// Replace the in-memory message list with the store's log for the
    /// current conversation.
    pub async fn load_history(&mut self) -> Result<(), OrchestratorError> {
        let conversation_id = self
            .conversation_id
            .clone()
            .ok_or(OrchestratorError::NoConversation)?;

        match self.store.read_all(&conversation_id).await {
            Ok(stored) => {
                self.messages = stored
                    .into_iter()
                    .map(|m| ConversationMessage {
                        id: m.id,
                        conversation_id: conversation_id.clone(),
                        content: m.content,
                        sender_kind: m.sender_kind,
                        agent_id: m.agent_id,
                        created_at: m.timestamp,
                    })
                    .collect();
                Ok(())
            }
            Err(e) => {
                log::error!("MultiAgentConversation: history load failed: {}", e);
                self.notices.push(Notice {
                    title: "Error Loading Conversation".to_string(),
                    detail: "Could not load previous messages from history.".to_string(),
                });
                self.messages.clear();
                Err(OrchestratorError::HistoryLoad(e.to_string()))
            }
        }
    }

    /// Record the contextual reference block as fetched with content.
    pub fn set_reference_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.reference = if content.trim().is_empty() {
            ReferenceContent::Empty
        } else {
            ReferenceContent::Loaded(content)
        };
    }

    /// Record the contextual reference block as fetched but empty.
    pub fn mark_reference_empty(&mut self) {
        self.reference = ReferenceContent::Empty;
    }

    pub fn reference(&self) -> &ReferenceContent {
        &self.reference
    }

    /// Add participants, skipping ids already present. Already-initialized
    /// agents keep their ledger entries; only genuinely new agents will be
    /// picked up by the next initialization pass.
    pub fn add_participants(&mut self, agents: Vec<AgentParticipant>) {
        for agent in agents {
            if self.participants.iter().any(|p| p.id == agent.id) {
                log::warn!(
                    "MultiAgentConversation: duplicate participant id {} ignored",
                    agent.id
                );
                continue;
            }
            self.participants.push(agent);
        }
    }

    pub fn participants(&self) -> &[AgentParticipant] {
        &self.participants
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Agent ids whose introductory exchange has completed for the current
    /// conversation.
    pub fn initialized_agents(&self) -> HashSet<String> {
        self.conversation_id
            .as_ref()
            .and_then(|id| self.ledgers.get(id))
            .cloned()
            .unwrap_or_default()
    }

    /// Take all pending user-visible notices.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn contextual_details(&self) -> HashMap<String, String> {
        let mut details = HashMap::new();
        let content = match &self.reference {
            ReferenceContent::Loaded(content) => content.clone(),
            _ => String::new(),
        };
        details.insert(REFERENCE_PLACEHOLDER.to_string(), content);
        details
    }

    /// Run one initialization pass: send the introductory exchange to every
    /// participant not yet in the ledger, sequentially.
    ///
    /// Returns the number of agents initialized by this pass. The pass is
    /// skipped entirely (returning 0) when no conversation is selected, no
    /// participants exist, the contextual reference has not been fetched, or
    /// another pass is already in flight.
    ///
    /// A failing agent is not added to the ledger, so it is retried on the
    /// next pass; its failure is surfaced as a notice and does not block the
    /// remaining agents. Successes are committed to the ledger in one batch
    /// after the pass.
    pub async fn initialize_agents(&mut self) -> Result<usize, OrchestratorError> {
        if self.initializing {
            log::debug!("MultiAgentConversation: initialization already in progress, skipping");
            return Ok(0);
        }
        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => {
                log::debug!("MultiAgentConversation: no conversation id, skipping init");
                return Ok(0);
            }
        };
        if self.participants.is_empty() {
            log::debug!("MultiAgentConversation: no participants, skipping init");
            return Ok(0);
        }
        if !self.reference.is_fetched() {
            log::debug!("MultiAgentConversation: reference data not yet loaded, skipping init");
            return Ok(0);
        }

        let ledger = self.ledgers.entry(conversation_id.clone()).or_default();
        let pending: Vec<AgentParticipant> = self
            .participants
            .iter()
            .filter(|p| !ledger.contains(&p.id))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        log::info!(
            "MultiAgentConversation: initializing {} agent(s) for conversation {}",
            pending.len(),
            conversation_id
        );
        self.initializing = true;
        self.busy = true;

        let details = self.contextual_details();
        let opening = vec![ConversationMessage::user(
            conversation_id.clone(),
            INTRODUCTORY_USER_LINE,
        )];
        let mut succeeded: Vec<String> = Vec::new();

        for agent in pending {
            match self
                .responder
                .respond(&agent, &opening, &details, TurnKind::Introduction)
                .await
            {
                Ok(text) => {
                    let message =
                        ConversationMessage::agent(conversation_id.clone(), agent.id.clone(), text);
                    self.messages.push(message.clone());
                    if let Err(e) = self
                        .store
                        .append(&conversation_id, message.to_stored())
                        .await
                    {
                        // Treated like a failed exchange: the agent stays out
                        // of the ledger and is retried next pass.
                        log::error!(
                            "MultiAgentConversation: could not persist intro for {}: {}",
                            agent.display_name,
                            e
                        );
                        self.notices.push(Notice {
                            title: format!("Error: {} Initial Message", agent.display_name),
                            detail: "The introduction could not be saved.".to_string(),
                        });
                        continue;
                    }
                    log::info!(
                        "MultiAgentConversation: agent {} initialized",
                        agent.display_name
                    );
                    succeeded.push(agent.id.clone());
                }
                Err(e) => {
                    log::error!(
                        "MultiAgentConversation: intro failed for {}: {}",
                        agent.display_name,
                        e
                    );
                    self.notices.push(Notice {
                        title: format!("Error: {} Initial Message", agent.display_name),
                        detail: e.to_string(),
                    });
                }
            }
        }

        let initialized = succeeded.len();
        self.ledgers
            .entry(conversation_id)
            .or_default()
            .extend(succeeded);
        self.initializing = false;
        self.busy = false;
        Ok(initialized)
    }

    /// Broadcast one user turn to every current participant sequentially.
    ///
    /// The user message is appended to in-memory state first and then
    /// persisted; a persistence failure surfaces as an error and aborts the
    /// rest of the turn (the in-memory message is not rolled back). Each
    /// agent then replies over a snapshot of the history taken right after
    /// the user turn, so siblings never see each other's replies within the
    /// same turn. A failing agent contributes a synthesized error-reply
    /// bearing its id rather than halting its siblings. Replies land in
    /// participant-list order.
    pub async fn send_message_to_agents(
        &mut self,
        content: &str,
    ) -> Result<(), OrchestratorError> {
        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => {
                log::warn!("MultiAgentConversation: send aborted, no conversation selected");
                return Ok(());
            }
        };
        if content.trim().is_empty() {
            log::warn!("MultiAgentConversation: send aborted, empty message");
            return Ok(());
        }
        if self.participants.is_empty() {
            log::warn!("MultiAgentConversation: send aborted, no participants");
            return Ok(());
        }

        self.busy = true;

        let user_message = ConversationMessage::user(conversation_id.clone(), content);
        self.messages.push(user_message.clone());
        if let Err(e) = self
            .store
            .append(&conversation_id, user_message.to_stored())
            .await
        {
            log::error!("MultiAgentConversation: could not persist user message: {}", e);
            self.notices.push(Notice {
                title: "Error Sending Message".to_string(),
                detail: "Your message could not be saved to history.".to_string(),
            });
            self.busy = false;
            return Err(OrchestratorError::StoreWrite(e.to_string()));
        }

        let details = self.contextual_details();
        let roster = self.participants.clone();
        // History for this turn ends at the user message; same-turn sibling
        // replies are not visible to later agents.
        let history = self.messages.clone();

        for agent in roster {
            let reply = match self
                .responder
                .respond(&agent, &history, &details, TurnKind::Reply)
                .await
            {
                Ok(text) => {
                    ConversationMessage::agent(conversation_id.clone(), agent.id.clone(), text)
                }
                Err(e) => {
                    log::error!(
                        "MultiAgentConversation: reply failed for {}: {}",
                        agent.display_name,
                        e
                    );
                    self.notices.push(Notice {
                        title: format!("Agent Error: {}", agent.display_name),
                        detail: e.to_string(),
                    });
                    ConversationMessage::agent(
                        conversation_id.clone(),
                        agent.id.clone(),
                        format!(
                            "Error: Could not get response from {}. ({})",
                            agent.display_name, e
                        ),
                    )
                }
            };
            self.messages.push(reply.clone());
            if let Err(e) = self.store.append(&conversation_id, reply.to_stored()).await {
                // Agent-message persistence is not separately guarded.
                log::error!(
                    "MultiAgentConversation: could not persist reply from {}: {}",
                    agent.display_name,
                    e
                );
            }
        }

        self.busy = false;
        Ok(())
    }
}
