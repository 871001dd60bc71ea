//! Prompt registry: fetch/cache layer mapping a closed set of prompt types to
//! stored template strings, with a required-parameter schema per type.
//!
//! Templates live in external prompt storage (the [`PromptStore`] trait) and
//! are loaded lazily on first request per type. Successful fetches are cached
//! in-process for the process lifetime; the cache has no expiry and is not
//! invalidated when the underlying store changes. If several stored records
//! share a type, the most recently created one wins deterministically.
//!
//! [`PromptRegistry::get_and_populate`] validates supplied parameters against
//! the static required-parameter table before the template populator ever
//! runs, so callers get a [`PromptError::MissingParameters`] naming the gaps
//! instead of a prompt with holes in it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::koinonia::client_wrapper::SendError;
use crate::koinonia::template;

/// Closed enumeration of valid prompt types. Strings outside this set are
/// rejected at the registry boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromptType {
    ChurchResearch,
    CommunityResearch,
    ScenarioBuilder,
    ScenarioRefinement,
    ScenarioInterrogatory,
    ScenarioFinalization,
    UnifiedScenarioResponse,
    Conversation,
    DiscernmentPlan,
    StrategicPlan,
    NarrativeBuilding,
    AssessmentReport,
    ChurchAssessment,
    CommunityAssessment,
}

impl PromptType {
    /// The storage key for this prompt type.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::ChurchResearch => "church_research",
            PromptType::CommunityResearch => "community_research",
            PromptType::ScenarioBuilder => "scenario_builder",
            PromptType::ScenarioRefinement => "scenario_refinement",
            PromptType::ScenarioInterrogatory => "scenario_interrogatory",
            PromptType::ScenarioFinalization => "scenario_finalization",
            PromptType::UnifiedScenarioResponse => "unified_scenario_response",
            PromptType::Conversation => "conversation",
            PromptType::DiscernmentPlan => "discernment_plan",
            PromptType::StrategicPlan => "strategic_plan",
            PromptType::NarrativeBuilding => "narrative_building",
            PromptType::AssessmentReport => "assessment_report",
            PromptType::ChurchAssessment => "church_assessment",
            PromptType::CommunityAssessment => "community_assessment",
        }
    }

    /// Every valid prompt type, useful for seeding stores and admin tooling.
    pub fn all() -> &'static [PromptType] {
        &[
            PromptType::ChurchResearch,
            PromptType::CommunityResearch,
            PromptType::ScenarioBuilder,
            PromptType::ScenarioRefinement,
            PromptType::ScenarioInterrogatory,
            PromptType::ScenarioFinalization,
            PromptType::UnifiedScenarioResponse,
            PromptType::Conversation,
            PromptType::DiscernmentPlan,
            PromptType::StrategicPlan,
            PromptType::NarrativeBuilding,
            PromptType::AssessmentReport,
            PromptType::ChurchAssessment,
            PromptType::CommunityAssessment,
        ]
    }

    /// The declared required-parameter set for this type.
    ///
    /// The table is static and closed; a required parameter that is absent or
    /// empty fails validation in [`PromptRegistry::get_and_populate`].
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            PromptType::ChurchResearch
            | PromptType::CommunityResearch
            | PromptType::StrategicPlan => &[],
            PromptType::ScenarioBuilder => &[
                "research_summary",
                "vocational_statement",
                "church_avatar",
                "community_avatar",
                "companion_name",
                "companion_type",
                "companion_traits",
                "companion_speech_pattern",
                "companion_knowledge_domains",
            ],
            PromptType::ScenarioRefinement | PromptType::UnifiedScenarioResponse => &[
                "scenario_details",
                "message_history",
                "church_avatar",
                "community_avatar",
                "companion_name",
                "companion_type",
                "companion_traits",
                "companion_speech_pattern",
                "companion_knowledge_domains",
            ],
            PromptType::ScenarioInterrogatory => &[
                "selected_scenario",
                "companion_avatar",
                "church_avatar",
                "community_avatar",
                "messages_entered",
            ],
            PromptType::ScenarioFinalization => &["message_history", "scenario_details"],
            PromptType::Conversation | PromptType::ChurchAssessment => &[
                "companion_name",
                "companion_type",
                "companion_traits",
                "companion_speech_pattern",
                "companion_knowledge_domains",
            ],
            PromptType::CommunityAssessment => &[
                "community_research",
                "companion_name",
                "companion_type",
                "companion_traits",
                "companion_speech_pattern",
                "companion_knowledge_domains",
            ],
            PromptType::DiscernmentPlan => &[
                "vocational_statement",
                "selected_scenarios",
                "messages_history",
                "church_avatar",
                "community_avatar",
                "companion_avatar",
                "companion_name",
                "companion_type",
                "companion_traits",
                "companion_speech_pattern",
                "companion_knowledge_domains",
            ],
            PromptType::NarrativeBuilding => &[
                "research_summary",
                "companion_avatar",
                "church_avatar",
                "community_avatar",
            ],
            PromptType::AssessmentReport => &[
                "church_name",
                "location",
                "church_assessment_messages",
                "community_assessment_messages",
                "church_assessment_data",
                "community_assessment_data",
                "companion_name",
                "companion_type",
                "companion_traits",
                "companion_speech_pattern",
                "companion_knowledge_domains",
            ],
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PromptType::all()
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| PromptError::UnknownType(s.to_string()))
    }
}

/// A stored prompt template record.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Prompt {
    pub id: String,
    pub prompt_type: String,
    /// The template body, possibly containing placeholders.
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Errors from registry lookups and parameter validation.
#[derive(Debug, Clone)]
pub enum PromptError {
    /// The string did not name a member of the closed prompt-type set.
    UnknownType(String),
    /// Zero stored templates exist for the requested type.
    NotFound(PromptType),
    /// A stored template exists but its body is empty.
    EmptyBody(PromptType),
    /// One or more declared required parameters were absent or empty.
    MissingParameters {
        prompt_type: PromptType,
        missing: Vec<String>,
    },
    /// The underlying prompt store failed.
    Store(String),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::UnknownType(s) => write!(f, "Unknown prompt type: {}", s),
            PromptError::NotFound(t) => write!(f, "No {} prompt found", t),
            PromptError::EmptyBody(t) => write!(f, "Prompt body for {} is empty", t),
            PromptError::MissingParameters {
                prompt_type,
                missing,
            } => write!(
                f,
                "Missing required parameters for {}: {}",
                prompt_type,
                missing.join(", ")
            ),
            PromptError::Store(msg) => write!(f, "Prompt store error: {}", msg),
        }
    }
}

impl std::error::Error for PromptError {}

/// External prompt storage.
///
/// `query_by_type` is the only operation on the orchestration hot path;
/// `insert` and `delete` exist for administrative tooling.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn query_by_type(&self, prompt_type: &str) -> Result<Vec<Prompt>, SendError>;

    async fn insert(&self, prompt: Prompt) -> Result<(), SendError>;

    async fn delete(&self, id: &str) -> Result<(), SendError>;
}

/// In-memory [`PromptStore`] for tests, demos, and seeding.
#[derive(Default)]
pub struct InMemoryPromptStore {
    prompts: Mutex<Vec<Prompt>>,
}

impl InMemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a template for `prompt_type`.
    pub fn with_prompt(self, prompt_type: PromptType, body: impl Into<String>) -> Self {
        self.prompts.lock().unwrap().push(Prompt {
            id: uuid::Uuid::new_v4().to_string(),
            prompt_type: prompt_type.as_str().to_string(),
            body: body.into(),
            created_at: Some(Utc::now()),
        });
        self
    }
}

#[async_trait]
impl PromptStore for InMemoryPromptStore {
    async fn query_by_type(&self, prompt_type: &str) -> Result<Vec<Prompt>, SendError> {
        Ok(self
            .prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.prompt_type == prompt_type)
            .cloned()
            .collect())
    }

    async fn insert(&self, prompt: Prompt) -> Result<(), SendError> {
        self.prompts.lock().unwrap().push(prompt);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SendError> {
        self.prompts.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }
}

/// Fetch/cache layer over a [`PromptStore`].
///
/// Clones share the cache, so a registry can be handed to several sessions
/// and each type is fetched from storage at most once per process.
#[derive(Clone)]
pub struct PromptRegistry {
    store: Arc<dyn PromptStore>,
    cache: Arc<Mutex<HashMap<PromptType, Prompt>>>,
}

impl PromptRegistry {
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        PromptRegistry {
            store,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the template for `prompt_type`, consulting the cache first.
    ///
    /// When storage holds more than one record for the type, the most
    /// recently created wins; records without a timestamp sort oldest.
    pub async fn get_by_type(&self, prompt_type: PromptType) -> Result<Prompt, PromptError> {
        if let Some(prompt) = self.cache.lock().unwrap().get(&prompt_type) {
            log::debug!("PromptRegistry: cache hit for type {}", prompt_type);
            return Ok(prompt.clone());
        }

        log::debug!("PromptRegistry: fetching type {} from store", prompt_type);
        let mut rows = self
            .store
            .query_by_type(prompt_type.as_str())
            .await
            .map_err(|e| PromptError::Store(e.to_string()))?;

        if rows.is_empty() {
            return Err(PromptError::NotFound(prompt_type));
        }

        if rows.len() > 1 {
            log::warn!(
                "PromptRegistry: {} templates stored for type {}, using most recent",
                rows.len(),
                prompt_type
            );
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        let chosen = rows.remove(0);

        self.cache
            .lock()
            .unwrap()
            .insert(prompt_type, chosen.clone());
        Ok(chosen)
    }

    /// Fetch, validate required parameters, and populate in one step.
    ///
    /// Returns [`PromptError::MissingParameters`] naming every required
    /// parameter that is absent or empty; the template populator is not
    /// invoked in that case.
    pub async fn get_and_populate(
        &self,
        prompt_type: PromptType,
        params: &HashMap<String, String>,
    ) -> Result<String, PromptError> {
        let prompt = self.get_by_type(prompt_type).await?;
        if prompt.body.is_empty() {
            return Err(PromptError::EmptyBody(prompt_type));
        }

        let missing: Vec<String> = prompt_type
            .required_parameters()
            .iter()
            .filter(|name| params.get(**name).map(|v| v.is_empty()).unwrap_or(true))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingParameters {
                prompt_type,
                missing,
            });
        }

        Ok(template::populate(&prompt.body, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn prompt(prompt_type: PromptType, body: &str, created_at: Option<DateTime<Utc>>) -> Prompt {
        Prompt {
            id: uuid::Uuid::new_v4().to_string(),
            prompt_type: prompt_type.as_str().to_string(),
            body: body.to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_get_by_type_not_found() {
        let registry = PromptRegistry::new(Arc::new(InMemoryPromptStore::new()));
        let err = registry
            .get_by_type(PromptType::Conversation)
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::NotFound(PromptType::Conversation)));
    }

    #[tokio::test]
    async fn test_most_recent_record_wins() {
        let store = InMemoryPromptStore::new();
        let older = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store
            .insert(prompt(PromptType::ChurchResearch, "old", Some(older)))
            .await
            .unwrap();
        store
            .insert(prompt(PromptType::ChurchResearch, "new", Some(newer)))
            .await
            .unwrap();
        store
            .insert(prompt(PromptType::ChurchResearch, "undated", None))
            .await
            .unwrap();

        let registry = PromptRegistry::new(Arc::new(store));
        let chosen = registry
            .get_by_type(PromptType::ChurchResearch)
            .await
            .unwrap();
        assert_eq!(chosen.body, "new");
    }

    #[tokio::test]
    async fn test_cache_survives_store_updates() {
        let store = Arc::new(InMemoryPromptStore::new());
        store
            .insert(prompt(PromptType::ChurchResearch, "v1", Some(Utc::now())))
            .await
            .unwrap();

        let registry = PromptRegistry::new(store.clone());
        assert_eq!(
            registry
                .get_by_type(PromptType::ChurchResearch)
                .await
                .unwrap()
                .body,
            "v1"
        );

        // A later store update does not invalidate the process-wide cache.
        store
            .insert(prompt(PromptType::ChurchResearch, "v2", Some(Utc::now())))
            .await
            .unwrap();
        assert_eq!(
            registry
                .get_by_type(PromptType::ChurchResearch)
                .await
                .unwrap()
                .body,
            "v1"
        );
    }

    #[tokio::test]
    async fn test_get_and_populate_missing_parameters() {
        let store = InMemoryPromptStore::new()
            .with_prompt(PromptType::DiscernmentPlan, "Plan for $(vocational_statement)");
        let registry = PromptRegistry::new(Arc::new(store));

        let err = registry
            .get_and_populate(PromptType::DiscernmentPlan, &HashMap::new())
            .await
            .unwrap_err();
        match err {
            PromptError::MissingParameters { missing, .. } => {
                assert!(missing.contains(&"vocational_statement".to_string()));
                assert!(missing.contains(&"companion_name".to_string()));
            }
            other => panic!("expected MissingParameters, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_value_counts_as_missing() {
        let store = InMemoryPromptStore::new()
            .with_prompt(PromptType::ScenarioFinalization, "$(message_history)");
        let registry = PromptRegistry::new(Arc::new(store));

        let mut params = HashMap::new();
        params.insert("message_history".to_string(), String::new());
        params.insert("scenario_details".to_string(), "d".to_string());

        let err = registry
            .get_and_populate(PromptType::ScenarioFinalization, &params)
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::MissingParameters { .. }));
    }

    #[tokio::test]
    async fn test_get_and_populate_success() {
        let store = InMemoryPromptStore::new().with_prompt(
            PromptType::ScenarioFinalization,
            "History: $(message_history)\nScenarios: $(scenario_details)",
        );
        let registry = PromptRegistry::new(Arc::new(store));

        let mut params = HashMap::new();
        params.insert("message_history".to_string(), "user: hi".to_string());
        params.insert("scenario_details".to_string(), "Title: T".to_string());

        let populated = registry
            .get_and_populate(PromptType::ScenarioFinalization, &params)
            .await
            .unwrap();
        assert_eq!(populated, "History: user: hi\nScenarios: Title: T");
    }

    #[test]
    fn test_prompt_type_round_trip() {
        for t in PromptType::all() {
            assert_eq!(*t, t.as_str().parse::<PromptType>().unwrap());
        }
        assert!("not_a_prompt".parse::<PromptType>().is_err());
    }
}
