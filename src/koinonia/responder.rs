//! Single-agent responder: given one agent's persona fields and a
//! conversation history, build a system instruction and invoke the
//! text-generation API exactly once.
//!
//! Persistence of the result is the orchestrator's responsibility; this
//! module has no side effects beyond the remote call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::koinonia::client_wrapper::{
    ChatMessage, GenerationRequest, Role, TextGenClient,
};
use crate::koinonia::config::KoinoniaConfig;
use crate::koinonia::conversation_store::{ConversationMessage, SenderKind};
use crate::koinonia::template;

/// A configured persona participating in a conversation.
///
/// Supplied externally per conversation; the orchestrator treats the set as
/// given and stable apart from membership growth.
#[derive(Clone, Debug)]
pub struct AgentParticipant {
    /// Stable identifier referenced by the initialization ledger and by
    /// agent-authored messages.
    pub id: String,
    /// Human-readable name used in prompts, notices, and error messages.
    pub display_name: String,
    /// What this agent is, e.g. "congregational elder".
    pub kind: String,
    /// Persona text; may embed placeholders such as `$(name)` or
    /// `$(discernment_plan_details)`.
    pub persona_template: String,
    pub description: String,
}

/// Which kind of turn an agent call serves. Introductory exchanges get a
/// shorter system instruction; regular turns add a clause pointing the model
/// at the ongoing conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnKind {
    Introduction,
    Reply,
}

/// How a single agent call failed.
#[derive(Debug, Clone)]
pub enum ResponderError {
    /// The call succeeded transport-wise but returned no usable text.
    EmptyResponse { agent: String },
    /// The service reported an explicit error; rate-limited errors carry a
    /// retry-after hint for display.
    Service {
        agent: String,
        message: String,
        retry_after_seconds: Option<u64>,
    },
    /// Transport or unexpected failure, wrapped with the agent identity for
    /// diagnostics.
    Transport { agent: String, detail: String },
}

impl fmt::Display for ResponderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponderError::EmptyResponse { agent } => {
                write!(f, "Agent {} returned an empty response.", agent)
            }
            ResponderError::Service {
                agent,
                message,
                retry_after_seconds: Some(secs),
            } => write!(
                f,
                "Agent {} is rate limited. Please try again in {}s. ({})",
                agent, secs, message
            ),
            ResponderError::Service { agent, message, .. } => {
                write!(f, "Failed to get response from agent {}: {}", agent, message)
            }
            ResponderError::Transport { agent, detail } => {
                write!(f, "Unexpected error from agent {}: {}", agent, detail)
            }
        }
    }
}

impl std::error::Error for ResponderError {}

/// Builds persona system instructions and performs one generation call per
/// agent turn.
#[derive(Clone)]
pub struct SingleAgentResponder {
    client: Arc<dyn TextGenClient>,
    max_tokens: u32,
    temperature: f32,
}

impl SingleAgentResponder {
    pub fn new(client: Arc<dyn TextGenClient>, config: &KoinoniaConfig) -> Self {
        SingleAgentResponder {
            client,
            max_tokens: config.reply_max_tokens,
            temperature: config.temperature,
        }
    }

    /// Build the system instruction for `agent`.
    ///
    /// Substitutes the `name`, `type` and `description` placeholders plus any
    /// contextual-details entries (e.g. `discernment_plan_details`) into the
    /// persona template. Missing contextual details simply leave nothing
    /// behind; the persona template is expected to degrade gracefully.
    /// Regular turns append a clause directing the model to weigh the
    /// conversation so far; introductions have no conversation yet and omit
    /// it.
    pub fn build_system_instruction(
        &self,
        agent: &AgentParticipant,
        contextual_details: &HashMap<String, String>,
        turn_kind: TurnKind,
    ) -> String {
        let mut params = contextual_details.clone();
        params.insert("name".to_string(), agent.display_name.clone());
        params.insert("type".to_string(), agent.kind.clone());
        params.insert("description".to_string(), agent.description.clone());

        let persona = template::populate(&agent.persona_template, &params);
        let closing = match turn_kind {
            TurnKind::Introduction => "Respond to the user from this perspective.",
            TurnKind::Reply => {
                "Respond to the user from this perspective, considering the \
                 ongoing conversation."
            }
        };
        format!(
            "You are {}, a {}. Your defined personality is: '{}'. \
             Your general description is: '{}'. {}",
            agent.display_name, agent.kind, persona, agent.description, closing
        )
    }

    /// Invoke the text-generation API once for `agent` over `history`.
    ///
    /// The request is one system message followed by the history mapped to
    /// alternating user/assistant roles by sender kind.
    pub async fn respond(
        &self,
        agent: &AgentParticipant,
        history: &[ConversationMessage],
        contextual_details: &HashMap<String, String>,
        turn_kind: TurnKind,
    ) -> Result<String, ResponderError> {
        let system = self.build_system_instruction(agent, contextual_details, turn_kind);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system));
        for msg in history {
            let role = match msg.sender_kind {
                SenderKind::User => Role::User,
                SenderKind::Agent => Role::Assistant,
            };
            messages.push(ChatMessage {
                role,
                content: msg.content.clone(),
            });
        }

        log::debug!(
            "SingleAgentResponder: sending {} messages for agent {}",
            messages.len(),
            agent.display_name
        );

        let response = self
            .client
            .generate(GenerationRequest {
                messages,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            })
            .await
            .map_err(|e| ResponderError::Transport {
                agent: agent.display_name.clone(),
                detail: e.to_string(),
            })?;

        if let Some(message) = response.error {
            return Err(ResponderError::Service {
                agent: agent.display_name.clone(),
                message,
                retry_after_seconds: if response.rate_limited {
                    response.retry_after_seconds.or(Some(0))
                } else {
                    None
                },
            });
        }

        match response.text {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(ResponderError::EmptyResponse {
                agent: agent.display_name.clone(),
            }),
        }
    }
}
