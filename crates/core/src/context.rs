//! Execution Context
//!
//! Defines `ToolContext`, handed to every tool invocation: the identity of
//! the current run, its working directory and its cancellation token.
//!
//! Tools only see `ToolContext`. They cannot mutate the thread or change the
//! run status; those belong to the run controller.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};

/// Context for tool-level execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    thread_id: String,
    run_id: String,
    working_directory: Option<PathBuf>,
    cancellation_token: CancellationToken,
}

impl ToolContext {
    /// Create a new ToolContext with a fresh, uncancelled token.
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            working_directory: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Identifier of the thread the run belongs to.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Identifier of the current run. Fresh per `send` invocation.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Set the working directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Share the run's cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// The run's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Working directory, or an error when none is configured.
    ///
    /// Tools that touch the filesystem with relative paths need one.
    pub fn require_working_directory(&self) -> CoreResult<&Path> {
        self.working_directory
            .as_deref()
            .ok_or(CoreError::NoWorkingDirectory)
    }
}
