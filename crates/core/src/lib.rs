//! Stepwise Core
//!
//! Foundational error types and the execution context handed to tools.
//! This crate has no dependencies on the conversation model, the completion
//! transport, or any tool implementation.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `context` - Tool execution context (`ToolContext`)

pub mod context;
pub mod error;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Context ────────────────────────────────────────────────────────────
pub use context::ToolContext;
