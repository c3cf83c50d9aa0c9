//! Utilities
//!
//! Error types and workspace path helpers used throughout the runtime.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;
