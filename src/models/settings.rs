//! Settings Models
//!
//! Agent configuration stored as JSON and turned into per-run options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Marker in the system prompt template replaced by tool-provided context.
pub const TOOL_CONTEXT_MARKER: &str = "{{tool_context}}";

/// Built-in system prompt template
pub const DEFAULT_SYSTEM_PROMPT_TEMPLATE: &str = "You are a careful coding assistant. \
Work step by step, use the available tools to inspect and change files, \
and give a short final answer once the task is done.\n\n{{tool_context}}";

/// How function calls are exchanged with the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallingMode {
    /// Native when the transport supports it, embedded otherwise
    #[default]
    Auto,
    /// Always use structured function calls
    Native,
    /// Always embed `<function>` spans in text
    FakeFunctions,
}

impl FunctionCallingMode {
    /// Whether to use embedded fake functions for a transport.
    pub fn use_fake_functions(self, transport_supports_functions: bool) -> bool {
        match self {
            Self::Auto => !transport_supports_functions,
            Self::Native => false,
            Self::FakeFunctions => true,
        }
    }
}

/// Truncate-old-messages compaction parameters, counted in steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionSettings {
    /// Steps always kept at the start of the history
    #[serde(default = "default_keep_first_steps")]
    pub keep_first_steps: usize,
    /// Minimum number of steps kept at the end of the history
    #[serde(default = "default_keep_last_steps")]
    pub keep_last_steps: usize,
    /// The omitted middle grows in multiples of this many steps
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_keep_first_steps() -> usize {
    1
}

fn default_keep_last_steps() -> usize {
    8
}

fn default_chunk_size() -> usize {
    4
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            keep_first_steps: default_keep_first_steps(),
            keep_last_steps: default_keep_last_steps(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Agent configuration stored in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Iteration budget of one run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub compaction: CompactionSettings,
    /// Workspace root for file tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Custom system prompt template; must contain the tool-context marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_template: Option<String>,
    #[serde(default)]
    pub function_calling: FunctionCallingMode,
    /// Function whose call ends the run with a structured result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_function: Option<String>,
}

fn default_max_iterations() -> usize {
    25
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            compaction: CompactionSettings::default(),
            working_directory: None,
            system_prompt_template: None,
            function_calling: FunctionCallingMode::default(),
            finish_function: None,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub max_iterations: Option<usize>,
    pub compaction: Option<CompactionSettings>,
    pub working_directory: Option<PathBuf>,
    pub system_prompt_template: Option<String>,
    pub function_calling: Option<FunctionCallingMode>,
    pub finish_function: Option<String>,
}

impl AgentSettings {
    /// Apply a partial update to the settings
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(max_iterations) = update.max_iterations {
            self.max_iterations = max_iterations;
        }
        if let Some(compaction) = update.compaction {
            self.compaction = compaction;
        }
        if let Some(dir) = update.working_directory {
            self.working_directory = Some(dir);
        }
        if let Some(template) = update.system_prompt_template {
            self.system_prompt_template = Some(template);
        }
        if let Some(mode) = update.function_calling {
            self.function_calling = mode;
        }
        if let Some(name) = update.finish_function {
            self.finish_function = Some(name);
        }
    }

    /// The effective system prompt template
    pub fn template(&self) -> &str {
        self.system_prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT_TEMPLATE)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }

        if self.compaction.chunk_size == 0 {
            return Err("compaction.chunk_size must be at least 1".to_string());
        }

        if !self.template().contains(TOOL_CONTEXT_MARKER) {
            return Err(format!(
                "system_prompt_template must contain the {} marker",
                TOOL_CONTEXT_MARKER
            ));
        }

        if matches!(self.finish_function.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err("finish_function must not be blank".to_string());
        }

        Ok(())
    }
}
