//! Stepwise Tools
//!
//! Core types and trait definitions for the tool layer:
//! - `ToolResult` - execution result of one structured call
//! - `Tool` trait - the collaborator contract every tool implements
//! - `ToolRegistry` - ordered registration and lookup
//! - `prompt_fallback` - the `<function>` embedding used when the model has
//!   no native function calling
//!
//! Concrete tools (code edits, file reads) and the dispatch layer live in the
//! root crate's `services::tools` module.

pub mod executor;
pub mod prompt_fallback;
pub mod trait_def;

// Re-export core types
pub use executor::{PseudoFunctionOutput, ToolResult};
pub use prompt_fallback::{
    build_function_manifest, encode_function_call, encode_function_response,
    from_fake_function_message, parse_function_spans, to_fake_function_messages,
    ParsedFunctionCall,
};
pub use trait_def::{Tool, ToolRegistry};
