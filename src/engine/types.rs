use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current checkpoint schema version. Bump only on breaking format changes.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Workflow-defined data collected across steps, keyed by field name.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// Free-form annotations attached to checkpoints and recorder notifications.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Kind of event that produced a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Auto,
    Manual,
    StepComplete,
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            CheckpointType::Auto => "auto",
            CheckpointType::Manual => "manual",
            CheckpointType::StepComplete => "step_complete",
        })
    }
}

/// Score recorded when a step completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepScore {
    /// Normalised score in `0.0..=1.0`.
    pub score: f64,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
}

/// Persistable view of a workflow's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub current_step: Option<String>,
    /// Completion order; a step appears at most once.
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub collected_data: FieldMap,
    #[serde(default)]
    pub step_scores: BTreeMap<String, StepScore>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowSnapshot {
    pub fn is_step_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    /// A step was started but never marked complete.
    pub fn has_unfinished_step(&self) -> bool {
        match &self.current_step {
            Some(step) => !self.is_step_completed(step),
            None => false,
        }
    }
}

/// Immutable, versioned snapshot written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub project_id: String,
    pub session_id: String,
    pub checkpoint_id: String,
    pub checkpoint_type: CheckpointType,
    pub created_at: DateTime<Utc>,
    pub workflow_state: WorkflowSnapshot,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Checkpoint {
    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            checkpoint_id: self.checkpoint_id.clone(),
            checkpoint_type: self.checkpoint_type,
            created_at: self.created_at,
            current_step: self.workflow_state.current_step.clone(),
            completed_steps: self.workflow_state.completed_steps.len(),
        }
    }
}

/// A checkpoint read back from a store, flagged when its schema version is not current.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub checkpoint: Checkpoint,
    pub version_mismatch: bool,
}

impl LoadedCheckpoint {
    pub fn new(checkpoint: Checkpoint) -> Self {
        let version_mismatch = checkpoint.version != CHECKPOINT_VERSION;
        Self {
            checkpoint,
            version_mismatch,
        }
    }
}

/// Cheap listing entry for a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    pub checkpoint_type: CheckpointType,
    pub created_at: DateTime<Utc>,
    pub current_step: Option<String>,
    pub completed_steps: usize,
}

/// State restored from a checkpoint.
#[derive(Debug, Clone)]
pub struct ResumedWorkflow {
    pub checkpoint_id: String,
    pub state: WorkflowSnapshot,
    pub metadata: Metadata,
    pub version_mismatch: bool,
}

/// Latest checkpoint shows a step that was started but never completed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncompleteSession {
    pub checkpoint_id: String,
    pub step: String,
    pub created_at: DateTime<Utc>,
    pub completed_steps: usize,
}

/// Definition of a single workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Ordered list of steps that make up a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// First defined step that is not yet completed.
    pub fn next_step(&self, state: &WorkflowSnapshot) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| !state.is_step_completed(&s.name))
    }
}

/// Read-only projection of a workflow for display.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub project_id: String,
    pub session_id: String,
    /// Percentage in `0.0..=100.0`; zero when no definition is known.
    pub progress: f64,
    pub current_step: Option<String>,
    pub next_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub step_scores: BTreeMap<String, StepScore>,
    pub average_score: Option<f64>,
    pub data: FieldMap,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
