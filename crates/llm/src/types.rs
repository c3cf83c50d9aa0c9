//! Conversation Types
//!
//! Core value types for messages exchanged with the completion transport.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Carries function responses back to the model
    Function,
}

/// A bounded line range captured from a file.
///
/// This is a value snapshot taken at capture time, not a live view of the
/// file. Line numbers are zero-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnippet {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Path relative to the project root, used in headers
    pub relative_path: String,
    /// First captured line (zero-indexed)
    pub line_start: usize,
    /// Number of captured lines
    pub line_count: usize,
    /// Total number of lines in the file at capture time
    pub file_line_count: usize,
    /// The captured text
    pub text: String,
}

impl FileSnippet {
    /// Capture `line_count` lines starting at `line_start` from `content`.
    ///
    /// The range is clamped to the file.
    pub fn capture(
        path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        content: &str,
        line_start: usize,
        line_count: usize,
    ) -> Self {
        let lines: Vec<&str> = if content.is_empty() {
            Vec::new()
        } else {
            content.split('\n').collect()
        };
        let start = line_start.min(lines.len());
        let end = start.saturating_add(line_count).min(lines.len());
        Self {
            path: path.into(),
            relative_path: relative_path.into(),
            line_start: start,
            line_count: end - start,
            file_line_count: lines.len(),
            text: lines[start..end].join("\n"),
        }
    }

    /// One past the last captured line.
    pub fn line_end(&self) -> usize {
        self.line_start + self.line_count
    }

    /// Whether this snippet covers the whole line range of `other` in the same file.
    pub fn covers(&self, other: &FileSnippet) -> bool {
        self.path == other.path
            && self.line_start <= other.line_start
            && self.line_end() >= other.line_end()
    }

    pub fn header(&self) -> String {
        if self.line_count == 0 {
            return format!("File: {} (empty range)", self.relative_path);
        }
        format!(
            "File: {} (lines {}-{} of {})",
            self.relative_path,
            self.line_start,
            self.line_end() - 1,
            self.file_line_count
        )
    }

    pub fn footer(&self) -> String {
        let remaining = self.file_line_count.saturating_sub(self.line_end());
        if remaining == 0 {
            "(end of file)".to_string()
        } else {
            format!("({} more lines below)", remaining)
        }
    }

    /// Render the snippet with its header and footer for the model.
    pub fn render(&self) -> String {
        format!("{}\n```\n{}\n```\n{}", self.header(), self.text, self.footer())
    }
}

/// Content item within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Plain text content
    Text { text: String },
    /// Captured line range of a file
    FileSnippet(FileSnippet),
    /// Image content (base64 encoded)
    Image { media_type: String, data: String },
    /// Whole-file attachment
    Attachment {
        path: PathBuf,
        name: String,
        text: String,
    },
}

impl ContentItem {
    /// Create a text item
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text { text: text.into() }
    }

    /// File path this item was captured from, if it is file context.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            ContentItem::FileSnippet(snippet) => Some(&snippet.path),
            ContentItem::Attachment { path, .. } => Some(path),
            ContentItem::Text { .. } | ContentItem::Image { .. } => None,
        }
    }

    /// Textual rendering for transports that only accept text.
    pub fn render_text(&self) -> Option<String> {
        match self {
            ContentItem::Text { text } => Some(text.clone()),
            ContentItem::FileSnippet(snippet) => Some(snippet.render()),
            ContentItem::Attachment { name, text, .. } => {
                Some(format!("Attachment: {}\n```\n{}\n```", name, text))
            }
            ContentItem::Image { .. } => None,
        }
    }
}

/// A structured function call emitted by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call identifier assigned by the transport, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name of the function to call
    pub name: String,
    /// Arguments as JSON text (may be partial while streaming)
    pub arguments: String,
}

impl FunctionCall {
    /// Create a call from structured arguments.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parse the argument payload. An empty payload parses as `{}`.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// The result of executing one function call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Identifier of the call this responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name of the function that was called
    pub name: String,
    /// Textual result handed back to the model
    pub text: String,
}

impl FunctionResponse {
    /// Create a response answering `call`.
    pub fn for_call(call: &FunctionCall, text: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            text: text.into(),
        }
    }
}

/// A role-tagged message with typed content and function traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedMessage {
    /// Role of the message sender
    pub role: Role,
    /// Ordered content items
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Structured function calls (assistant messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    /// Structured function responses (function messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_responses: Vec<FunctionResponse>,
}

impl TaggedMessage {
    /// Create a message from content items
    pub fn new(role: Role, content: Vec<ContentItem>) -> Self {
        Self {
            role,
            content,
            function_calls: Vec::new(),
            function_responses: Vec::new(),
        }
    }

    /// Create a simple text message
    pub fn text_message(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentItem::text(text)])
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message(Role::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text)
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message(Role::System, text)
    }

    /// Create an assistant message carrying function calls
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<FunctionCall>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentItem::text(text)]
        };
        Self {
            role: Role::Assistant,
            content,
            function_calls: calls,
            function_responses: Vec::new(),
        }
    }

    /// Create a function-role message carrying responses
    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: Role::Function,
            content: Vec::new(),
            function_calls: Vec::new(),
            function_responses: responses,
        }
    }

    pub fn has_function_calls(&self) -> bool {
        !self.function_calls.is_empty()
    }

    /// Plain text of the message: every text item, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the message carries nothing at all
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.function_calls.is_empty() && self.function_responses.is_empty()
    }
}

/// JSON Schema for function parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, ParameterSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSchema>>,
}

impl ParameterSchema {
    fn scalar(schema_type: &str, description: Option<&str>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: description.map(|s| s.to_string()),
            properties: None,
            required: None,
            items: None,
        }
    }

    /// Create a string schema
    pub fn string(description: Option<&str>) -> Self {
        Self::scalar("string", description)
    }

    /// Create an integer schema
    pub fn integer(description: Option<&str>) -> Self {
        Self::scalar("integer", description)
    }

    /// Create a boolean schema
    pub fn boolean(description: Option<&str>) -> Self {
        Self::scalar("boolean", description)
    }

    /// Create an object schema
    pub fn object(
        description: Option<&str>,
        properties: HashMap<String, ParameterSchema>,
        required: Vec<String>,
    ) -> Self {
        Self {
            properties: Some(properties),
            required: Some(required),
            ..Self::scalar("object", description)
        }
    }

    /// Create an array schema
    pub fn array(description: Option<&str>, items: ParameterSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::scalar("array", description)
        }
    }
}

/// Definition of a function the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    /// Unique name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON schema for the function's parameters
    pub parameters: ParameterSchema,
}

/// Error types for completion transport operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Network/connection error
    NetworkError { message: String },
    /// Server error from the provider
    ServerError {
        message: String,
        status: Option<u16>,
    },
    /// Invalid request (bad parameters)
    InvalidRequest { message: String },
    /// Response parsing error
    ParseError { message: String },
    /// Provider not available
    ProviderUnavailable { message: String },
    /// Other error
    Other { message: String },
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::NetworkError { message } => write!(f, "Network error: {}", message),
            LlmError::ServerError { message, status } => {
                if let Some(s) = status {
                    write!(f, "Server error ({}): {}", s, message)
                } else {
                    write!(f, "Server error: {}", message)
                }
            }
            LlmError::InvalidRequest { message } => write!(f, "Invalid request: {}", message),
            LlmError::ParseError { message } => write!(f, "Parse error: {}", message),
            LlmError::ProviderUnavailable { message } => {
                write!(f, "Provider unavailable: {}", message)
            }
            LlmError::Other { message } => write!(f, "Error: {}", message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Result type for transport operations
pub type LlmResult<T> = Result<T, LlmError>;
