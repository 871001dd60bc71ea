//! [`OpenAIClient`] implements [`TextGenClient`] for OpenAI's Chat
//! Completions API (and any OpenAI-compatible endpoint via
//! [`OpenAIClient::new_with_base_url`]).
//!
//! Service-level failures are folded into the soft fields of
//! [`GenerationResponse`]: HTTP 429 becomes `rate_limited` with a
//! `retry_after_seconds` hint taken from the `Retry-After` header, and other
//! non-success statuses become a human-readable `error`. Only transport
//! failures (connection errors, timeouts, undecodable payloads) surface as
//! `Err`.
//!
//! # Example
//!
//! ```rust,no_run
//! use koinonia::clients::openai::OpenAIClient;
//! use koinonia::{ChatMessage, GenerationRequest, TextGenClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let secret_key = std::env::var("OPEN_AI_SECRET").expect("OPEN_AI_SECRET not set");
//!     let client = OpenAIClient::new(&secret_key, "gpt-4o-mini");
//!
//!     let response = client
//!         .generate(GenerationRequest {
//!             messages: vec![
//!                 ChatMessage::system("You are an assistant."),
//!                 ChatMessage::user("Hello!"),
//!             ],
//!             max_tokens: 256,
//!             temperature: 0.7,
//!         })
//!         .await
//!         .unwrap();
//!
//!     if let Some(text) = response.text {
//!         println!("Assistant: {}", text);
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::koinonia::client_wrapper::{
    GenerationRequest, GenerationResponse, SendError, TextGenClient,
};
use crate::koinonia::clients::common::get_shared_http_client;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for OpenAI's Chat Completions API.
///
/// Reuses the shared pooled HTTP client configured in
/// [`crate::koinonia::clients::common`] and applies a per-request timeout so
/// a hung remote call fails instead of stalling the caller indefinitely.
pub struct OpenAIClient {
    http: reqwest::Client,
    secret_key: String,
    /// Model name injected into each request.
    model: String,
    base_url: String,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and model name.
    pub fn new(secret_key: &str, model: &str) -> Self {
        Self::new_with_base_url(secret_key, model, DEFAULT_BASE_URL)
    }

    /// Construct a client targeting a custom OpenAI-compatible base URL
    /// (e.g. a self-hosted deployment or an edge-function proxy).
    pub fn new_with_base_url(secret_key: &str, model: &str, base_url: &str) -> Self {
        OpenAIClient {
            http: get_shared_http_client(),
            secret_key: secret_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenClient for OpenAIClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, SendError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("OpenAIClient::generate(...): transport error: {}", e);
                Box::new(e) as SendError
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            log::warn!(
                "OpenAIClient::generate(...): rate limited, retry after {:?}s",
                retry_after_seconds
            );
            return Ok(GenerationResponse {
                text: None,
                error: Some("Rate limit exceeded".to_string()),
                rate_limited: true,
                retry_after_seconds,
            });
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            log::error!(
                "OpenAIClient::generate(...): API error {}: {}",
                status,
                detail
            );
            return Ok(GenerationResponse {
                text: None,
                error: Some(format!("API request failed with status {}", status)),
                rate_limited: false,
                retry_after_seconds: None,
            });
        }

        let reply: ChatCompletionReply = response.json().await.map_err(|e| {
            log::error!("OpenAIClient::generate(...): undecodable payload: {}", e);
            Box::new(e) as SendError
        })?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty());

        Ok(GenerationResponse {
            text,
            error: None,
            rate_limited: false,
            retry_after_seconds: None,
        })
    }
}
