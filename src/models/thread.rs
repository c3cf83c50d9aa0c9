//! Thread Models
//!
//! The conversation aggregate: ordered steps plus the agent status.

use serde::{Deserialize, Serialize};

use crate::models::step::Step;

/// Agent status of a thread
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentStatus {
    /// No run in flight
    #[default]
    #[serde(rename = "none")]
    Idle,
    /// A run is in flight
    Running { run_id: String },
    /// The run is suspended; it keeps its id so unpausing can resume it
    Paused { run_id: String },
    /// The last run failed
    StoppedWithError { message: String },
}

impl AgentStatus {
    /// Whether a run currently owns the thread
    pub fn is_busy(&self) -> bool {
        matches!(self, AgentStatus::Running { .. } | AgentStatus::Paused { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, AgentStatus::Paused { .. })
    }

    /// The id of the run owning the thread, if any
    pub fn run_id(&self) -> Option<&str> {
        match self {
            AgentStatus::Running { run_id } | AgentStatus::Paused { run_id } => Some(run_id),
            AgentStatus::Idle | AgentStatus::StoppedWithError { .. } => None,
        }
    }

    /// Whether the status is `Running` for exactly this run
    pub fn is_running(&self, run_id: &str) -> bool {
        matches!(self, AgentStatus::Running { run_id: current } if current == run_id)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "none"),
            AgentStatus::Running { run_id } => write!(f, "running({})", run_id),
            AgentStatus::Paused { run_id } => write!(f, "paused({})", run_id),
            AgentStatus::StoppedWithError { message } => write!(f, "stopped with error: {}", message),
        }
    }
}

/// Conversation aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub status: AgentStatus,
}

impl Thread {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            status: AgentStatus::Idle,
        }
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn last_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.last_mut()
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|step| step.id == step_id)
    }

    /// Replace the last step if it has the same id, otherwise append.
    pub fn append_or_update(&mut self, step: Step) {
        match self.steps.last_mut() {
            Some(last) if last.id == step.id => *last = step,
            _ => self.steps.push(step),
        }
    }

    /// Repair steps left incomplete by an interrupted run.
    pub fn fix_incomplete_steps(&mut self) {
        for step in self.steps.iter_mut().filter(|step| !step.is_complete()) {
            tracing::debug!(step_id = %step.id, "[ThreadStore] repairing interrupted step");
            step.fix_if_incomplete();
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}
