//! Roundtable scenario-refinement flow.
//!
//! A [`RoundtableSession`] runs a guided chat between the user and a
//! companion persona about a set of ministry scenarios: a scripted kickoff,
//! free-form back and forth, an optional interrogation of one scenario, and
//! a finalization turn whose reply is parsed into structured
//! [`ScenarioItem`]s by the [`scenario_parse`](crate::koinonia::scenario_parse)
//! pipeline.
//!
//! The hidden system prompt is held outside the displayed transcript; chat
//! turns send the transcript only, while kickoff prepends the system prompt
//! and finalization/interrogation each send a single populated prompt.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use koinonia::clients::openai::OpenAIClient;
//! use koinonia::prompts::{InMemoryPromptStore, PromptRegistry, PromptType};
//! use koinonia::{KoinoniaConfig, RoundtableSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(OpenAIClient::new("api_key", "gpt-4o-mini"));
//! let registry = PromptRegistry::new(Arc::new(InMemoryPromptStore::new()));
//!
//! let mut session = RoundtableSession::new(
//!     client,
//!     registry,
//!     KoinoniaConfig::default(),
//!     PromptType::ChurchResearch,
//! );
//! session.load_system_prompt().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::koinonia::client_wrapper::{ChatMessage, GenerationRequest, Role, TextGenClient};
use crate::koinonia::config::KoinoniaConfig;
use crate::koinonia::prompts::{PromptError, PromptRegistry, PromptType};
use crate::koinonia::scenario_parse::{parse_refined_scenarios, ScenarioItem};
use crate::koinonia::template;

/// Companion persona steering the roundtable voice. Every field has a
/// neutral fallback so a session without a chosen companion still produces
/// a complete prompt parameter map.
#[derive(Clone, Debug)]
pub struct CompanionProfile {
    pub name: String,
    pub kind: String,
    pub traits: String,
    pub speech_pattern: String,
    pub knowledge_domains: String,
}

impl Default for CompanionProfile {
    fn default() -> Self {
        CompanionProfile {
            name: "Your Companion".to_string(),
            kind: "helpful assistant".to_string(),
            traits: "inquisitive, supportive".to_string(),
            speech_pattern: "clear and encouraging".to_string(),
            knowledge_domains: "general topics".to_string(),
        }
    }
}

/// A named point of view (church-side or community-side) woven into prompts.
#[derive(Clone, Debug)]
pub struct AvatarProfile {
    pub name: String,
    pub point_of_view: String,
}

fn avatar_info(avatar: Option<&AvatarProfile>, fallback: &str) -> String {
    match avatar {
        Some(a) => format!("{} (representing {})", a.name, a.point_of_view),
        None => fallback.to_string(),
    }
}

/// Roundtable flow failures.
#[derive(Debug)]
pub enum RoundtableError {
    /// Prompt lookup or population failed.
    Prompt(PromptError),
    /// A guard condition blocked the call; the detail names which.
    NotReady(&'static str),
    /// The service reported a generation failure.
    Generation(String),
    /// The service returned no usable text.
    EmptyResponse,
    /// Transport-level failure talking to the service.
    Transport(String),
}

impl fmt::Display for RoundtableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundtableError::Prompt(e) => write!(f, "Prompt error: {}", e),
            RoundtableError::NotReady(reason) => write!(f, "Not ready: {}", reason),
            RoundtableError::Generation(msg) => write!(f, "Generation failed: {}", msg),
            RoundtableError::EmptyResponse => write!(f, "The companion returned no response."),
            RoundtableError::Transport(msg) => write!(f, "Request failed: {}", msg),
        }
    }
}

impl std::error::Error for RoundtableError {}

impl From<PromptError> for RoundtableError {
    fn from(e: PromptError) -> Self {
        RoundtableError::Prompt(e)
    }
}

/// One roundtable refinement session.
pub struct RoundtableSession {
    client: Arc<dyn TextGenClient>,
    registry: PromptRegistry,
    config: KoinoniaConfig,
    system_prompt_type: PromptType,
    system_prompt: Option<ChatMessage>,
    /// Displayed transcript; never contains the hidden system prompt.
    transcript: Vec<ChatMessage>,
    processing: bool,
    companion: Option<CompanionProfile>,
}

impl RoundtableSession {
    pub fn new(
        client: Arc<dyn TextGenClient>,
        registry: PromptRegistry,
        config: KoinoniaConfig,
        system_prompt_type: PromptType,
    ) -> Self {
        RoundtableSession {
            client,
            registry,
            config,
            system_prompt_type,
            system_prompt: None,
            transcript: Vec::new(),
            processing: false,
            companion: None,
        }
    }

    pub fn set_companion(&mut self, companion: Option<CompanionProfile>) {
        self.companion = companion;
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn system_prompt_loaded(&self) -> bool {
        self.system_prompt.is_some()
    }

    /// Finalization becomes available once the companion has spoken.
    pub fn can_finalize(&self) -> bool {
        !self.processing && self.transcript.iter().any(|m| m.role == Role::Assistant)
    }

    /// Fetch and cache the hidden system prompt for this session's type.
    pub async fn load_system_prompt(&mut self) -> Result<(), PromptError> {
        let populated = self
            .registry
            .get_and_populate(self.system_prompt_type, &HashMap::new())
            .await?;
        self.system_prompt = Some(ChatMessage::system(populated));
        Ok(())
    }

    fn companion(&self) -> CompanionProfile {
        self.companion.clone().unwrap_or_default()
    }

    fn scenario_details(scenarios: &[ScenarioItem]) -> String {
        scenarios
            .iter()
            .map(|s| format!("Title: {}\nDescription: {}", s.title, s.description))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn companion_params(&self, params: &mut HashMap<String, String>) {
        let companion = self.companion();
        params.insert("companion_name".to_string(), companion.name.clone());
        params.insert("companion_type".to_string(), companion.kind.clone());
        params.insert("companion_traits".to_string(), companion.traits.clone());
        params.insert(
            "companion_speech_pattern".to_string(),
            companion.speech_pattern.clone(),
        );
        params.insert(
            "companion_knowledge_domains".to_string(),
            companion.knowledge_domains.clone(),
        );
        params.insert(
            "companion_avatar".to_string(),
            serde_json::json!({
                "name": companion.name,
                "type": companion.kind,
                "traits": companion.traits,
                "speech_pattern": companion.speech_pattern,
                "knowledge_domains": companion.knowledge_domains,
            })
            .to_string(),
        );
    }

    fn kickoff_params(
        &self,
        scenarios: &[ScenarioItem],
        church: Option<&AvatarProfile>,
        community: Option<&AvatarProfile>,
    ) -> HashMap<String, String> {
        let details = Self::scenario_details(scenarios);
        let single = if scenarios.len() == 1 {
            format!(
                "Title: {}\nDescription: {}",
                scenarios[0].title, scenarios[0].description
            )
        } else {
            String::new()
        };
        let history = if self.transcript.is_empty() {
            "(no prior conversation)".to_string()
        } else {
            self.transcript_text()
        };

        let mut params = HashMap::new();
        params.insert("single_selected_scenario-details".to_string(), single);
        params.insert("message_history".to_string(), history.clone());
        params.insert("messages_entered".to_string(), history);
        params.insert("scenario_details".to_string(), details.clone());
        params.insert("selected_scenario".to_string(), details);
        params.insert(
            "church_avatar".to_string(),
            avatar_info(church, "The Church Perspective"),
        );
        params.insert(
            "community_avatar".to_string(),
            avatar_info(community, "The Community Perspective"),
        );
        params.insert("scenario_count".to_string(), scenarios.len().to_string());
        self.companion_params(&mut params);
        params
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, RoundtableError> {
        let response = self
            .client
            .generate(GenerationRequest {
                messages,
                max_tokens,
                temperature,
            })
            .await
            .map_err(|e| RoundtableError::Transport(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(RoundtableError::Generation(error));
        }
        match response.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(RoundtableError::EmptyResponse),
        }
    }

    /// Kick off the refinement conversation.
    ///
    /// Clears the transcript, populates `kickoff_type` with the full
    /// scenario/avatar/companion parameter map, and sends it as the opening
    /// user turn beneath the hidden system prompt. Exactly one assistant
    /// message lands in the transcript on success.
    pub async fn start_refinement(
        &mut self,
        kickoff_type: PromptType,
        scenarios: &[ScenarioItem],
        church: Option<&AvatarProfile>,
        community: Option<&AvatarProfile>,
    ) -> Result<(), RoundtableError> {
        if scenarios.is_empty() {
            return Err(RoundtableError::NotReady("no scenarios selected"));
        }
        if self.processing {
            return Err(RoundtableError::NotReady("a previous call is still processing"));
        }
        if self.system_prompt.is_none() {
            return Err(RoundtableError::NotReady("system prompt not loaded"));
        }

        self.processing = true;
        let result = self
            .start_refinement_inner(kickoff_type, scenarios, church, community)
            .await;
        self.processing = false;
        result
    }

    async fn start_refinement_inner(
        &mut self,
        kickoff_type: PromptType,
        scenarios: &[ScenarioItem],
        church: Option<&AvatarProfile>,
        community: Option<&AvatarProfile>,
    ) -> Result<(), RoundtableError> {
        self.transcript.clear();

        let params = self.kickoff_params(scenarios, church, community);
        let populated = self.registry.get_and_populate(kickoff_type, &params).await?;
        log::debug!("RoundtableSession: kickoff with prompt type {}", kickoff_type);

        let system = self
            .system_prompt
            .clone()
            .ok_or(RoundtableError::NotReady("system prompt not loaded"))?;
        let text = self
            .generate(
                vec![system, ChatMessage::user(populated)],
                self.config.kickoff_max_tokens,
                self.config.temperature,
            )
            .await?;

        self.transcript.push(ChatMessage::assistant(text));
        Ok(())
    }

    /// Send one user turn and append the companion's reply.
    ///
    /// Only the displayed transcript goes over the wire; the hidden system
    /// prompt is excluded. On failure the user turn stays in the transcript.
    pub async fn send_message(&mut self, text: &str) -> Result<(), RoundtableError> {
        if self.processing {
            return Err(RoundtableError::NotReady("a previous call is still processing"));
        }

        self.processing = true;
        let result = self.send_message_inner(text).await;
        self.processing = false;
        result
    }

    async fn send_message_inner(&mut self, text: &str) -> Result<(), RoundtableError> {
        self.transcript.push(ChatMessage::user(text));

        let reply = self
            .generate(
                self.transcript.clone(),
                self.config.chat_max_tokens,
                self.config.temperature,
            )
            .await?;

        self.transcript.push(ChatMessage::assistant(reply));
        Ok(())
    }

    /// Distill the conversation into refined scenarios.
    ///
    /// The full transcript plus the original scenario text go through the
    /// `ScenarioFinalization` prompt as a single system message, and the
    /// reply runs through the parse pipeline. Returns at least one item on
    /// success; the transcript itself is left untouched.
    pub async fn finalize(
        &mut self,
        selected: &[ScenarioItem],
    ) -> Result<Vec<ScenarioItem>, RoundtableError> {
        if self.processing {
            return Err(RoundtableError::NotReady("a previous call is still processing"));
        }
        if self.transcript.is_empty() {
            return Err(RoundtableError::NotReady("no conversation to finalize"));
        }

        self.processing = true;
        let result = self.finalize_inner(selected).await;
        self.processing = false;
        result
    }

    async fn finalize_inner(
        &mut self,
        selected: &[ScenarioItem],
    ) -> Result<Vec<ScenarioItem>, RoundtableError> {
        let mut params = HashMap::new();
        params.insert("message_history".to_string(), self.transcript_text());
        params.insert(
            "scenario_details".to_string(),
            Self::scenario_details(selected),
        );
        params.insert("scenario_count".to_string(), selected.len().to_string());
        self.companion_params(&mut params);

        let populated = self
            .registry
            .get_and_populate(PromptType::ScenarioFinalization, &params)
            .await?;

        let text = self
            .generate(
                vec![ChatMessage::system(populated)],
                self.config.finalize_max_tokens,
                self.config.finalize_temperature,
            )
            .await?;

        let refined = parse_refined_scenarios(&text);
        log::info!(
            "RoundtableSession: finalization produced {} scenario(s)",
            refined.len()
        );
        Ok(refined)
    }

    /// Put one scenario under scrutiny.
    ///
    /// Restarts the displayed transcript with a synthetic user line naming
    /// the scenario, then asks the `ScenarioInterrogatory` prompt (populated
    /// directly, bypassing required-parameter validation) for the
    /// companion's probing reply.
    pub async fn interrogate(
        &mut self,
        scenario: &ScenarioItem,
        church: Option<&AvatarProfile>,
        community: Option<&AvatarProfile>,
    ) -> Result<(), RoundtableError> {
        if self.processing {
            return Err(RoundtableError::NotReady("a previous call is still processing"));
        }

        self.processing = true;
        let result = self.interrogate_inner(scenario, church, community).await;
        self.processing = false;
        result
    }

    async fn interrogate_inner(
        &mut self,
        scenario: &ScenarioItem,
        church: Option<&AvatarProfile>,
        community: Option<&AvatarProfile>,
    ) -> Result<(), RoundtableError> {
        self.transcript.clear();
        self.transcript.push(ChatMessage::user(format!(
            "Let's explore this scenario: \"{}\"",
            scenario.title
        )));

        let prompt = self
            .registry
            .get_by_type(PromptType::ScenarioInterrogatory)
            .await?;

        let companion = self.companion();
        let history = self
            .transcript
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "User",
                    _ => companion.name.as_str(),
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut params = HashMap::new();
        params.insert(
            "selected_scenario".to_string(),
            format!("Scenario \"{}\": {}", scenario.title, scenario.description),
        );
        params.insert(
            "church_avatar".to_string(),
            avatar_info(church, "The Church Perspective"),
        );
        params.insert(
            "community_avatar".to_string(),
            avatar_info(community, "The Community Perspective"),
        );
        params.insert("messages_entered".to_string(), history);
        self.companion_params(&mut params);

        let full_prompt = template::populate(&prompt.body, &params);

        let text = self
            .generate(
                vec![ChatMessage::user(full_prompt)],
                self.config.interrogate_max_tokens,
                self.config.temperature,
            )
            .await?;

        self.transcript.push(ChatMessage::assistant(text));
        Ok(())
    }
}
