//! Stepwise LLM
//!
//! Conversation value types shared by every layer of the agent runtime, plus
//! the contract of the completion transport:
//! - `types` - tagged messages, content items, function calls and responses
//! - `provider` - the `CompletionClient` streaming trait
//! - `scripted` - a deterministic in-process client for tests and demos
//!
//! Network transports live outside this workspace and implement
//! `CompletionClient`.

pub mod provider;
pub mod scripted;
pub mod types;

pub use provider::{CompletionClient, PartialMessageStream};
pub use scripted::{CompletionRequest, ScriptedClient, ScriptedTurn};
pub use types::*;
