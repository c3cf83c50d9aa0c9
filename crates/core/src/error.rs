//! Core Error Types
//!
//! Errors raised by the foundation crate itself. The root crate wraps them
//! in its run-level error type.

use thiserror::Error;

/// Core error type for the Stepwise workspace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A filesystem tool ran without a working directory to resolve paths against
    #[error("No working directory configured for this run")]
    NoWorkingDirectory,
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;
