//! Error Handling
//!
//! Unified error types for the agent runtime.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use stepwise_core::CoreError;
use stepwise_llm::LlmError;

use crate::services::edits::EditError;

/// Runtime-wide error type
#[derive(Error, Debug)]
pub enum AgentError {
    /// A run is already in flight (or paused) on this thread
    #[error("Agent is already running on this thread")]
    AlreadyRunning,

    /// A structured function call matched no registered tool
    #[error("Unknown tool name: {0}")]
    UnknownToolName(String),

    /// The run was cancelled cooperatively
    #[error("Run cancelled")]
    Cancelled,

    /// Completion transport failures
    #[error("Transport error: {0}")]
    Transport(#[from] LlmError),

    /// Code-edit parse, planning or application errors
    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    /// Errors from the foundation crate
    #[error("{0}")]
    Core(#[from] CoreError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for runtime errors
pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a cooperative cancellation rather than a failure.
    ///
    /// Cancellations are never recorded as `StoppedWithError`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
