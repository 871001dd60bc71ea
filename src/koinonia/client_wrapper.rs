use async_trait::async_trait;
use std::error::Error;

/// A TextGenClient is a wrapper around a remote text-generation service.
/// It provides a common interface for the responder and the roundtable flow,
/// which are the only two callers. It does not keep track of the
/// conversation; the orchestrator and the roundtable session own history and
/// pass the relevant prefix to every call.

/// Represents the possible roles for a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Set by the engine to steer the model's persona and behavior.
    System,
    /// A message sent by the human user (or relayed verbatim by the app).
    User,
    /// Content the model generated as a response to a user message.
    Assistant,
}

impl Role {
    /// String identifier used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message to be sent to the text-generation API.
#[derive(Clone, Debug)]
pub struct ChatMessage {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single text-generation request: an ordered message list plus a bounded
/// token budget and a fixed sampling temperature.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Outcome of a text-generation call that completed transport-wise.
///
/// Service-level failures (including rate limiting) are reported through the
/// soft fields here rather than as `Err`; only transport and unexpected
/// failures surface as `Err` from [`TextGenClient::generate`].
#[derive(Clone, Debug, Default)]
pub struct GenerationResponse {
    /// Generated text, absent when the service produced no usable content.
    pub text: Option<String>,
    /// Human-readable service error, absent on success.
    pub error: Option<String>,
    /// True when the service signalled rate limiting.
    pub rate_limited: bool,
    /// Retry-after hint in seconds, present with some rate-limit responses.
    pub retry_after_seconds: Option<u64>,
}

impl GenerationResponse {
    /// Convenience constructor for a plain successful response.
    pub fn with_text(text: impl Into<String>) -> Self {
        GenerationResponse {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Type alias for a Send-able error box.
pub type SendError = Box<dyn Error + Send + Sync>;

/// Trait defining the interface to the remote text-generation service.
#[async_trait]
pub trait TextGenClient: Send + Sync {
    /// Perform exactly one generation call.
    ///
    /// Implementations must translate service-level failures into the soft
    /// fields of [`GenerationResponse`] and reserve `Err` for transport
    /// failures (connection refused, timeout, malformed payloads).
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, SendError>;
}
