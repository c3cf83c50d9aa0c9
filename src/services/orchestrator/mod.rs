//! Agent Orchestrator Module
//!
//! Coordinates completion transport calls with tool dispatch in the agent
//! run loop, and assembles the outbound prompt of every iteration.

pub mod prompt;
mod service;

pub use prompt::{
    assemble_system_prompt, build_prompt, compact_steps, elide_redundant_context,
    OLD_MESSAGES_OMITTED, SUPERSEDED_CONTEXT,
};
pub use service::{
    finish_function_schema, AgentRunController, RunOptions, FINISHED_TEXT, SKIPPED_TEXT,
    TIMED_OUT_TEXT,
};
