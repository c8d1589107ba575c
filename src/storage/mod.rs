pub mod json_store;
pub mod null_store;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::engine::types::*;

/// Errors surfaced by checkpoint persistence. Never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupt checkpoint record {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Versioned snapshot persistence for one project's workflow.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Project whose checkpoints this store holds.
    fn project_id(&self) -> &str;

    /// Write a full snapshot as a new versioned record and mirror it to `latest`.
    async fn save(
        &self,
        session_id: &str,
        state: &WorkflowSnapshot,
        checkpoint_type: CheckpointType,
        metadata: Metadata,
    ) -> Result<String, CheckpointError>;

    /// Load `latest` (no id) or a specific checkpoint. `None` when nothing matches.
    async fn load(&self, checkpoint_id: Option<&str>)
    -> Result<Option<LoadedCheckpoint>, CheckpointError>;

    /// Summaries of all versioned records, newest first.
    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError>;

    /// Remove one versioned record. Returns whether it existed.
    async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, CheckpointError>;

    /// Keep the `keep_count` most recent records, delete the rest. Returns the number removed.
    async fn cleanup_old_checkpoints(&self, keep_count: usize) -> Result<usize, CheckpointError>;

    /// Rebuild workflow state from a checkpoint. The snapshot is returned verbatim.
    async fn resume_workflow(
        &self,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<ResumedWorkflow>, CheckpointError> {
        let Some(loaded) = self.load(checkpoint_id).await? else {
            return Ok(None);
        };
        let Checkpoint {
            checkpoint_id,
            workflow_state,
            metadata,
            ..
        } = loaded.checkpoint;

        Ok(Some(ResumedWorkflow {
            checkpoint_id,
            state: workflow_state,
            metadata,
            version_mismatch: loaded.version_mismatch,
        }))
    }

    /// Detect a session interrupted mid-step, judged from the latest checkpoint.
    async fn detect_incomplete_session(&self) -> Result<Option<IncompleteSession>, CheckpointError> {
        let Some(loaded) = self.load(None).await? else {
            return Ok(None);
        };
        let checkpoint = loaded.checkpoint;
        if !checkpoint.workflow_state.has_unfinished_step() {
            return Ok(None);
        }

        let step = checkpoint.workflow_state.current_step.clone().unwrap_or_default();
        warn!(
            project = %checkpoint.project_id,
            step = %step,
            checkpoint = %checkpoint.checkpoint_id,
            "Incomplete session detected"
        );

        Ok(Some(IncompleteSession {
            checkpoint_id: checkpoint.checkpoint_id,
            step,
            created_at: checkpoint.created_at,
            completed_steps: checkpoint.workflow_state.completed_steps.len(),
        }))
    }
}

/// Creation time for the next checkpoint, strictly after `last`.
pub(crate) fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match last {
        Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// Assemble an immutable checkpoint with a content-addressed id.
pub(crate) fn build_checkpoint(
    project_id: &str,
    session_id: &str,
    state: &WorkflowSnapshot,
    checkpoint_type: CheckpointType,
    metadata: Metadata,
    created_at: DateTime<Utc>,
) -> Result<Checkpoint, CheckpointError> {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(state)?);
    let digest = hex::encode(hasher.finalize());

    Ok(Checkpoint {
        version: CHECKPOINT_VERSION,
        project_id: project_id.to_string(),
        session_id: session_id.to_string(),
        checkpoint_id: format!("ckpt_{}", &digest[..16]),
        checkpoint_type,
        created_at,
        workflow_state: state.clone(),
        metadata,
    })
}
