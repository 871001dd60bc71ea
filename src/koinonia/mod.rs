// src/koinonia/mod.rs

pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod conversation_store;
pub mod orchestrator;
pub mod prompts;
pub mod responder;
pub mod roundtable;
pub mod scenario_parse;
pub mod template;

// Explicitly export the two session types so they are reachable as
// koinonia::MultiAgentConversation and koinonia::RoundtableSession.
pub use orchestrator::MultiAgentConversation;
pub use roundtable::RoundtableSession;
