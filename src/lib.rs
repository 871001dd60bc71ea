//! # Koinonia
//!
//! Koinonia is a conversation orchestration and prompt templating engine for
//! discernment roundtables: conversations in which several configured agent
//! personas each reply to every user turn, plus a narrower single-assistant
//! refinement flow that turns free-form conversation into structured scenario
//! records.
//!
//! The crate provides layered abstractions for:
//!
//! * **Prompt Templating**: [`template::populate`] resolves `${key}`, `$(key)`
//!   and `<KEY>` placeholders against a parameter map in a single pass
//! * **Prompt Registry**: [`PromptRegistry`] fetches stored templates by
//!   [`PromptType`], caches them for the process lifetime, and validates
//!   required parameters before any template is populated
//! * **Single-Agent Responses**: [`SingleAgentResponder`] builds a persona
//!   system instruction and performs exactly one text-generation call per
//!   agent turn, classifying the outcome into typed failures
//! * **Multi-Agent Orchestration**: [`MultiAgentConversation`] initializes
//!   each participant exactly once per conversation, broadcasts user turns to
//!   every participant sequentially, and isolates per-agent failures
//! * **Roundtable Refinement**: [`RoundtableSession`] runs a scripted
//!   single-assistant refinement conversation and a finalization step whose
//!   free-text model reply is parsed back into [`ScenarioItem`] records
//!   through an ordered fallback chain that never yields an empty list
//! * **Provider Flexibility**: the [`TextGenClient`] trait abstracts the
//!   remote text-generation API; [`clients::openai::OpenAIClient`] is the
//!   bundled implementation
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use koinonia::clients::openai::OpenAIClient;
//! use koinonia::conversation_store::InMemoryConversationStore;
//! use koinonia::{AgentParticipant, KoinoniaConfig, MultiAgentConversation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     koinonia::init_logger();
//!
//!     let client = Arc::new(OpenAIClient::new(
//!         &std::env::var("OPEN_AI_SECRET")?,
//!         "gpt-4o-mini",
//!     ));
//!     let store = Arc::new(InMemoryConversationStore::new());
//!
//!     let mut conversation =
//!         MultiAgentConversation::new(client, store, KoinoniaConfig::default());
//!     conversation.set_conversation(Some("conv-1".to_string()));
//!     conversation.add_participants(vec![AgentParticipant {
//!         id: "elder".into(),
//!         display_name: "Elder Ruth".into(),
//!         kind: "congregational elder".into(),
//!         persona_template: "You value tradition, $(name).".into(),
//!         description: "A long-time member of the congregation.".into(),
//!     }]);
//!     conversation.mark_reference_empty();
//!
//!     conversation.initialize_agents().await?;
//!     conversation.send_message_to_agents("Where should we begin?").await?;
//!
//!     for message in conversation.messages() {
//!         println!("{:?}: {}", message.sender_kind, message.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Continue exploring the modules re-exported from the crate root for the
//! roundtable refinement flow and the scenario parse pipeline.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Lightweight on purpose so applications embedding Koinonia can opt in to
/// `RUST_LOG` driven diagnostics without choosing a logging backend upfront.
///
/// ```rust
/// koinonia::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod koinonia;

pub use koinonia::client_wrapper;
pub use koinonia::client_wrapper::{
    ChatMessage, GenerationRequest, GenerationResponse, Role, TextGenClient,
};
pub use koinonia::clients;
pub use koinonia::config::KoinoniaConfig;
pub use koinonia::conversation_store;
pub use koinonia::conversation_store::{
    ConversationMessage, ConversationStore, SenderKind, StoredMessage,
};
pub use koinonia::orchestrator;
pub use koinonia::orchestrator::{
    MultiAgentConversation, Notice, OrchestratorError, ReferenceContent,
};
pub use koinonia::prompts;
pub use koinonia::prompts::{Prompt, PromptError, PromptRegistry, PromptStore, PromptType};
pub use koinonia::responder;
pub use koinonia::responder::{AgentParticipant, ResponderError, SingleAgentResponder, TurnKind};
pub use koinonia::roundtable;
pub use koinonia::roundtable::{
    AvatarProfile, CompanionProfile, RoundtableError, RoundtableSession,
};
pub use koinonia::scenario_parse;
pub use koinonia::scenario_parse::ScenarioItem;
pub use koinonia::template;
