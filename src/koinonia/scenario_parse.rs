//! Parsing the finalization reply back into structured scenario records.
//!
//! The model is asked for JSON but free-text replies are common enough that
//! parsing runs as an ordered fallback chain, each stage returning either a
//! structured result or "no match", never failing:
//!
//! 1. strict JSON parse, then shape coercion: a bare array of scenarios, an
//!    object with a `scenarios` array, or a single scenario-shaped object;
//! 2. regex extraction of `"title"`/`"description"` pairs from malformed
//!    JSON-ish text;
//! 3. raw-text fallback: one item whose description is the whole reply.
//!
//! The chain guarantees a terminal value, so [`parse_refined_scenarios`]
//! never returns an empty list.
//!
//! The regex stage assumes the field names `title` and `description` appear
//! verbatim in the malformed output; it is a best-effort heuristic tied to
//! the current prompt wording and may produce low-quality data rather than
//! failing loudly.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A refined ministry scenario.
///
/// Produced only by parsing a model reply; never hand-constructed except as
/// the parse-failure fallback with empty optional fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioItem {
    #[serde(default = "fresh_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub strategic_rationale: String,
    #[serde(default)]
    pub theological_justification: String,
    #[serde(default)]
    pub potential_challenges_benefits: String,
    #[serde(default)]
    pub success_indicators: String,
    #[serde(default)]
    pub impact_on_community: String,
    #[serde(default, rename = "is_refined")]
    pub is_refined: bool,
}

fn fresh_id() -> String {
    format!("scenario-{}", uuid::Uuid::new_v4())
}

impl ScenarioItem {
    /// A bare scenario with every optional field empty.
    pub fn bare(title: impl Into<String>, description: impl Into<String>) -> Self {
        ScenarioItem {
            id: fresh_id(),
            title: title.into(),
            description: description.into(),
            target_audience: Vec::new(),
            strategic_rationale: String::new(),
            theological_justification: String::new(),
            potential_challenges_benefits: String::new(),
            success_indicators: String::new(),
            impact_on_community: String::new(),
            is_refined: false,
        }
    }
}

/// Parse a finalization reply into at least one [`ScenarioItem`].
pub fn parse_refined_scenarios(raw: &str) -> Vec<ScenarioItem> {
    if let Some(value) = try_strict_json(raw) {
        if let Some(items) = try_shape_coercion(&value) {
            log::debug!(
                "scenario_parse: strict JSON yielded {} scenario(s)",
                items.len()
            );
            return items;
        }
    } else if let Some(items) = try_regex_extraction(raw) {
        log::warn!(
            "scenario_parse: reply was not valid JSON, regex extraction recovered {} scenario(s)",
            items.len()
        );
        return items;
    }

    log::warn!("scenario_parse: no recognizable structure, falling back to raw text");
    raw_text_fallback(raw)
}

/// Stage 1: strict JSON parse of the whole reply.
fn try_strict_json(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

/// Stage 1b: interpret a parsed JSON value as scenario data.
fn try_shape_coercion(value: &Value) -> Option<Vec<ScenarioItem>> {
    match value {
        Value::Array(items) => {
            let scenarios: Vec<ScenarioItem> =
                items.iter().filter_map(scenario_from_value).collect();
            if scenarios.is_empty() {
                None
            } else {
                Some(scenarios)
            }
        }
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("scenarios") {
                let scenarios: Vec<ScenarioItem> =
                    items.iter().filter_map(scenario_from_value).collect();
                if !scenarios.is_empty() {
                    return Some(scenarios);
                }
            }
            if map.contains_key("scenario")
                || map.contains_key("scenarioTitle")
                || map.contains_key("title")
            {
                // Single scenario object, wrapped as a one-element array.
                return scenario_from_value(value).map(|s| vec![s]);
            }
            // Unrecognized object: salvage what we can rather than failing.
            let title = str_field(map, &["Title", "title"])
                .unwrap_or_else(|| "Refined Scenario".to_string());
            let description = str_field(map, &["Description", "description"])
                .unwrap_or_else(|| serde_json::to_string_pretty(value).unwrap_or_default());
            Some(vec![ScenarioItem::bare(title, description)])
        }
        _ => None,
    }
}

/// Build one scenario from a JSON object, tolerating the field-name variants
/// models actually produce.
fn scenario_from_value(value: &Value) -> Option<ScenarioItem> {
    let map = value.as_object()?;

    let title = str_field(map, &["scenarioTitle", "title", "scenario"]);
    let description = str_field(map, &["description", "scenarioDescription"]);
    if title.is_none() && description.is_none() {
        return None;
    }

    let target_audience = match map.get("targetAudience") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    };

    let potential_challenges_benefits = str_field(map, &["potentialChallengesBenefits"])
        .unwrap_or_else(|| {
            match (
                str_field(map, &["potentialChallenges"]),
                str_field(map, &["potentialBenefits"]),
            ) {
                (Some(challenges), Some(benefits)) => {
                    format!("Challenges: {}\n\nBenefits: {}", challenges, benefits)
                }
                (Some(challenges), None) => format!("Challenges: {}", challenges),
                (None, Some(benefits)) => format!("Benefits: {}", benefits),
                (None, None) => String::new(),
            }
        });

    Some(ScenarioItem {
        id: str_field(map, &["id"]).unwrap_or_else(fresh_id),
        title: title.unwrap_or_else(|| "Refined Scenario".to_string()),
        description: description.unwrap_or_default(),
        target_audience,
        strategic_rationale: str_field(map, &["strategicRationale", "rationale"])
            .unwrap_or_default(),
        theological_justification: str_field(map, &["theologicalJustification"])
            .unwrap_or_default(),
        potential_challenges_benefits,
        success_indicators: str_field(map, &["successIndicators"]).unwrap_or_default(),
        impact_on_community: str_field(map, &["impactOnCommunity"]).unwrap_or_default(),
        is_refined: true,
    })
}

fn str_field(map: &serde_json::Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| map.get(*name))
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .find(|s| !s.is_empty())
}

lazy_static! {
    static ref TITLE_RE: Regex =
        Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap();
    static ref DESCRIPTION_RE: Regex =
        Regex::new(r#""description"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap();
}

/// Stage 2: pull `"title"`/`"description"` pairs out of malformed JSON-ish
/// text and synthesize an array from them.
fn try_regex_extraction(raw: &str) -> Option<Vec<ScenarioItem>> {
    let titles: Vec<String> = TITLE_RE
        .captures_iter(raw)
        .map(|c| unescape(&c[1]))
        .collect();
    let descriptions: Vec<String> = DESCRIPTION_RE
        .captures_iter(raw)
        .map(|c| unescape(&c[1]))
        .collect();

    if titles.is_empty() && descriptions.is_empty() {
        return None;
    }

    let count = titles.len().max(descriptions.len());
    let items = (0..count)
        .map(|i| {
            let mut item = ScenarioItem::bare(
                titles
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| "Refined Scenario".to_string()),
                descriptions.get(i).cloned().unwrap_or_default(),
            );
            item.is_refined = true;
            item
        })
        .collect();
    Some(items)
}

fn unescape(s: &str) -> String {
    s.replace("\\\"", "\"").replace("\\n", "\n")
}

/// Stage 3: terminal fallback, one item carrying the raw reply.
fn raw_text_fallback(raw: &str) -> Vec<ScenarioItem> {
    vec![ScenarioItem::bare("Refined Scenario", raw)]
}
