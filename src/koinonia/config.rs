//! Configuration for Koinonia.
//!
//! Provides the [`KoinoniaConfig`] struct holding the generation budgets and
//! sampling temperatures used by the orchestrator and the roundtable flow.
//! Users construct this manually — no file parsing dependencies are required.
//!
//! # Example
//!
//! ```rust
//! use koinonia::KoinoniaConfig;
//!
//! // Use the defaults
//! let config = KoinoniaConfig::default();
//!
//! // Or tighten the reply budget
//! let config = KoinoniaConfig {
//!     reply_max_tokens: 800,
//!     ..KoinoniaConfig::default()
//! };
//! ```

/// Generation budgets and temperatures for the conversation flows.
///
/// This struct is intentionally minimal and users construct it however they
/// want. No TOML, YAML, or other config-file parsing dependencies are
/// introduced.
#[derive(Clone, Debug)]
pub struct KoinoniaConfig {
    /// Token budget for agent replies (initialization and per-turn).
    pub reply_max_tokens: u32,
    /// Token budget for the roundtable kickoff assistant message.
    pub kickoff_max_tokens: u32,
    /// Token budget for free-form roundtable turns.
    pub chat_max_tokens: u32,
    /// Token budget for the finalization call.
    pub finalize_max_tokens: u32,
    /// Token budget for scenario interrogation replies; the interrogatory
    /// prompt asks for short questions, not long narratives.
    pub interrogate_max_tokens: u32,
    /// Sampling temperature for conversational calls.
    pub temperature: f32,
    /// Sampling temperature for the finalization call; lower so the model
    /// sticks closer to the requested structured format.
    pub finalize_temperature: f32,
}

impl Default for KoinoniaConfig {
    fn default() -> Self {
        Self {
            reply_max_tokens: 1500,
            kickoff_max_tokens: 250,
            chat_max_tokens: 500,
            finalize_max_tokens: 1000,
            interrogate_max_tokens: 200,
            temperature: 0.7,
            finalize_temperature: 0.5,
        }
    }
}
