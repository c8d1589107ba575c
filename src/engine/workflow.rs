use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::engine::types::*;
use crate::recorder::{ProjectRecorder, log_outcome};
use crate::storage::{CheckpointError, CheckpointStore};

/// Authoritative in-process view of one workflow session.
///
/// Every meaningful mutation persists a checkpoint before returning. Mutations
/// take `&mut self`, so a save always finishes before the next one starts.
pub struct WorkflowSession {
    session_id: String,
    state: WorkflowSnapshot,
    store: Arc<dyn CheckpointStore>,
    recorder: Arc<dyn ProjectRecorder>,
    definition: Option<WorkflowDefinition>,
    auto_save: bool,
    last_checkpoint: Option<String>,
    resumed_metadata: Metadata,
}

impl WorkflowSession {
    /// Open the session for `session_id`, resuming from the latest checkpoint
    /// when it belongs to the same session.
    pub async fn open(
        store: Arc<dyn CheckpointStore>,
        recorder: Arc<dyn ProjectRecorder>,
        session_id: &str,
    ) -> Result<Self, CheckpointError> {
        let mut session = Self::new(store, recorder, session_id);

        if let Some(loaded) = session.store.load(None).await? {
            if loaded.checkpoint.project_id != session.project_id() {
                warn!(
                    project = %session.project_id(),
                    other = %loaded.checkpoint.project_id,
                    "Latest checkpoint belongs to another project; starting fresh"
                );
            } else if loaded.checkpoint.session_id == session_id {
                info!(
                    project = %session.project_id(),
                    session = %session_id,
                    checkpoint = %loaded.checkpoint.checkpoint_id,
                    "Resuming workflow from latest checkpoint"
                );
                session.last_checkpoint = Some(loaded.checkpoint.checkpoint_id);
                session.state = loaded.checkpoint.workflow_state;
                session.resumed_metadata = loaded.checkpoint.metadata;
            } else {
                info!(
                    project = %session.project_id(),
                    session = %session_id,
                    other = %loaded.checkpoint.session_id,
                    "Latest checkpoint belongs to another session; starting fresh"
                );
            }
        }

        Ok(session)
    }

    /// Empty session that has not touched storage yet.
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        recorder: Arc<dyn ProjectRecorder>,
        session_id: &str,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: WorkflowSnapshot::default(),
            store,
            recorder,
            definition: None,
            auto_save: true,
            last_checkpoint: None,
            resumed_metadata: Metadata::new(),
        }
    }

    pub fn with_definition(mut self, definition: WorkflowDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Toggle checkpointing on field saves. Step transitions always checkpoint.
    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    pub fn project_id(&self) -> &str {
        self.store.project_id()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &WorkflowSnapshot {
        &self.state
    }

    pub fn last_checkpoint(&self) -> Option<&str> {
        self.last_checkpoint.as_deref()
    }

    /// Metadata of the checkpoint this session was resumed from.
    pub fn resumed_metadata(&self) -> &Metadata {
        &self.resumed_metadata
    }

    // --- Step transitions ---

    pub async fn start_step(&mut self, step: &str) -> Result<String, CheckpointError> {
        let now = Utc::now();
        self.state.current_step = Some(step.to_string());
        if self.state.started_at.is_none() {
            self.state.started_at = Some(now);
        }
        self.state.updated_at = Some(now);

        info!(project = %self.project_id(), step = %step, "Step started");

        let mut metadata = Metadata::new();
        metadata.insert("event".to_string(), json!("step_start"));
        metadata.insert("step".to_string(), json!(step));
        self.persist(CheckpointType::Auto, metadata).await
    }

    /// Mark a step complete. Completing the same step twice never duplicates it.
    pub async fn complete_step(
        &mut self,
        step: &str,
        score: f64,
        summary: Option<&str>,
    ) -> Result<String, CheckpointError> {
        let clamped = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        if clamped != score {
            warn!(step = %step, score, clamped, "Step score outside 0..=1, clamping");
        }

        let now = Utc::now();
        if !self.state.is_step_completed(step) {
            self.state.completed_steps.push(step.to_string());
        }
        self.state.step_scores.insert(
            step.to_string(),
            StepScore {
                score: clamped,
                completed_at: now,
                summary: summary.unwrap_or_default().to_string(),
            },
        );
        self.state.updated_at = Some(now);

        info!(project = %self.project_id(), step = %step, score = clamped, "Step completed");

        let mut metadata = Metadata::new();
        metadata.insert("event".to_string(), json!("step_complete"));
        metadata.insert("step".to_string(), json!(step));
        metadata.insert("score".to_string(), json!(clamped));
        let checkpoint_id = self.persist(CheckpointType::StepComplete, metadata).await?;

        let mut milestone = Metadata::new();
        milestone.insert("score".to_string(), json!(clamped));
        milestone.insert("summary".to_string(), json!(summary.unwrap_or_default()));
        milestone.insert("checkpoint_id".to_string(), json!(checkpoint_id));
        let outcome = self
            .recorder
            .record_milestone(self.store.project_id(), &self.session_id, step, &milestone)
            .await;
        log_outcome("record_milestone", outcome);

        Ok(checkpoint_id)
    }

    // --- Data collection ---

    /// Save one field. Returns the checkpoint id when auto-save wrote one.
    pub async fn save_field(
        &mut self,
        name: &str,
        value: serde_json::Value,
        step: Option<&str>,
    ) -> Result<Option<String>, CheckpointError> {
        let mut fields = FieldMap::new();
        fields.insert(name.to_string(), value);
        self.save_requirements(fields, step).await
    }

    /// Merge many fields at once, overwriting existing keys. One checkpoint per call.
    pub async fn save_requirements(
        &mut self,
        fields: FieldMap,
        step: Option<&str>,
    ) -> Result<Option<String>, CheckpointError> {
        let names: Vec<String> = fields.keys().cloned().collect();
        self.state.collected_data.extend(fields);
        self.state.updated_at = Some(Utc::now());

        if !self.auto_save {
            return Ok(None);
        }

        let mut metadata = Metadata::new();
        metadata.insert("event".to_string(), json!("fields_saved"));
        metadata.insert("fields".to_string(), json!(names));
        if let Some(step) = step {
            metadata.insert("step".to_string(), json!(step));
        }
        self.persist(CheckpointType::Auto, metadata).await.map(Some)
    }

    // --- Queries ---

    pub fn is_step_completed(&self, step: &str) -> bool {
        self.state.is_step_completed(step)
    }

    pub fn step_score(&self, step: &str) -> Option<f64> {
        self.state.step_scores.get(step).map(|s| s.score)
    }

    pub fn field_value(&self, name: &str, default: serde_json::Value) -> serde_json::Value {
        self.state
            .collected_data
            .get(name)
            .cloned()
            .unwrap_or(default)
    }

    /// Read-only projection for display.
    pub fn export_summary(&self) -> WorkflowSummary {
        let total = self.definition.as_ref().map(|d| d.total_steps()).unwrap_or(0);
        let progress = if total == 0 {
            0.0
        } else {
            (self.state.completed_steps.len() as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };

        let average_score = if self.state.step_scores.is_empty() {
            None
        } else {
            let sum: f64 = self.state.step_scores.values().map(|s| s.score).sum();
            Some(sum / self.state.step_scores.len() as f64)
        };

        WorkflowSummary {
            project_id: self.project_id().to_string(),
            session_id: self.session_id.clone(),
            progress,
            current_step: self.state.current_step.clone(),
            next_step: self
                .definition
                .as_ref()
                .and_then(|d| d.next_step(&self.state))
                .map(|s| s.name.clone()),
            completed_steps: self.state.completed_steps.clone(),
            step_scores: self.state.step_scores.clone(),
            average_score,
            data: self.state.collected_data.clone(),
            started_at: self.state.started_at,
            updated_at: self.state.updated_at,
        }
    }

    // --- Explicit persistence ---

    /// Write a manual checkpoint of the current state.
    pub async fn checkpoint(&mut self, metadata: Metadata) -> Result<String, CheckpointError> {
        self.persist(CheckpointType::Manual, metadata).await
    }

    /// Replace the in-memory state with a specific checkpoint's snapshot.
    /// Returns `false` when the checkpoint does not exist.
    pub async fn resume_from(&mut self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        let Some(resumed) = self.store.resume_workflow(Some(checkpoint_id)).await? else {
            return Ok(false);
        };
        if resumed.version_mismatch {
            warn!(checkpoint = %checkpoint_id, "Resuming from a checkpoint with a different schema version");
        }
        self.state = resumed.state;
        self.resumed_metadata = resumed.metadata;
        self.last_checkpoint = Some(resumed.checkpoint_id);
        Ok(true)
    }

    /// Clear all progress and persist the empty state. Earlier checkpoints are kept.
    pub async fn reset(&mut self) -> Result<String, CheckpointError> {
        self.state = WorkflowSnapshot::default();
        self.resumed_metadata.clear();

        info!(project = %self.project_id(), session = %self.session_id, "Workflow reset");

        let mut metadata = Metadata::new();
        metadata.insert("event".to_string(), json!("reset"));
        metadata.insert("reason".to_string(), json!("reset"));
        self.persist(CheckpointType::Manual, metadata).await
    }

    async fn persist(
        &mut self,
        checkpoint_type: CheckpointType,
        metadata: Metadata,
    ) -> Result<String, CheckpointError> {
        let id = self
            .store
            .save(&self.session_id, &self.state, checkpoint_type, metadata)
            .await?;
        self.last_checkpoint = Some(id.clone());
        Ok(id)
    }
}
