//! Conversation storage: an append-only per-conversation message log keyed by
//! an opaque conversation identifier.
//!
//! The store is an external collaborator; this module defines the trait the
//! orchestrator writes through plus the message records themselves. Messages
//! are never mutated after creation and this subsystem never deletes them.
//! There is no query capability beyond a full-log read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::koinonia::client_wrapper::SendError;

/// Who produced a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    User,
    Agent,
}

/// A message in a multi-agent conversation.
///
/// Within a conversation, messages are totally ordered by creation sequence;
/// the history presented to any agent is a prefix of this order.
#[derive(Clone, Debug)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub sender_kind: SenderKind,
    /// Present iff `sender_kind` is [`SenderKind::Agent`].
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// A user turn, relayed verbatim.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            sender_kind: SenderKind::User,
            agent_id: None,
            created_at: Utc::now(),
        }
    }

    /// An agent turn bearing the producing agent's id.
    pub fn agent(
        conversation_id: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            sender_kind: SenderKind::Agent,
            agent_id: Some(agent_id.into()),
            created_at: Utc::now(),
        }
    }

    /// The record written to the conversation store for this message.
    pub fn to_stored(&self) -> StoredMessage {
        StoredMessage {
            id: self.id.clone(),
            content: self.content.clone(),
            sender_kind: self.sender_kind,
            agent_id: self.agent_id.clone(),
            timestamp: self.created_at,
        }
    }
}

/// The persisted form of a conversation message.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub content: String,
    pub sender_kind: SenderKind,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only per-conversation message log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one message to the conversation's log.
    async fn append(&self, conversation_id: &str, message: StoredMessage)
        -> Result<(), SendError>;

    /// Read the full log for a conversation in append order.
    async fn read_all(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, SendError>;
}

/// In-memory [`ConversationStore`] for tests and demos.
#[derive(Default)]
pub struct InMemoryConversationStore {
    logs: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored under `conversation_id`.
    pub fn len(&self, conversation_id: &str) -> usize {
        self.logs
            .lock()
            .unwrap()
            .get(conversation_id)
            .map(|log| log.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, conversation_id: &str) -> bool {
        self.len(conversation_id) == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        message: StoredMessage,
    ) -> Result<(), SendError> {
        self.logs
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn read_all(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, SendError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
