use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::engine::types::*;
use crate::storage::{CheckpointError, CheckpointStore, build_checkpoint, next_timestamp};

#[derive(Default)]
struct Inner {
    checkpoints: Vec<Checkpoint>,
    latest: Option<Checkpoint>,
    last_created: Option<DateTime<Utc>>,
}

/// In-memory checkpoint store for dry runs and tests.
/// Holds checkpoints only for the lifetime of the store instance.
pub struct NullCheckpointStore {
    project_id: String,
    inner: Mutex<Inner>,
}

impl NullCheckpointStore {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of versioned checkpoints currently held.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.checkpoints.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CheckpointStore for NullCheckpointStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn save(
        &self,
        session_id: &str,
        state: &WorkflowSnapshot,
        checkpoint_type: CheckpointType,
        metadata: Metadata,
    ) -> Result<String, CheckpointError> {
        let mut inner = self.inner.lock().await;
        let created_at = next_timestamp(inner.last_created);
        let checkpoint = build_checkpoint(
            &self.project_id,
            session_id,
            state,
            checkpoint_type,
            metadata,
            created_at,
        )?;

        let id = checkpoint.checkpoint_id.clone();
        inner.last_created = Some(created_at);
        inner.latest = Some(checkpoint.clone());
        inner.checkpoints.push(checkpoint);
        Ok(id)
    }

    async fn load(
        &self,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<LoadedCheckpoint>, CheckpointError> {
        let inner = self.inner.lock().await;
        let found = match checkpoint_id {
            None => inner.latest.clone(),
            Some(id) => inner
                .checkpoints
                .iter()
                .find(|cp| cp.checkpoint_id == id)
                .cloned(),
        };
        Ok(found.map(LoadedCheckpoint::new))
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<CheckpointSummary> =
            inner.checkpoints.iter().map(Checkpoint::summary).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        let mut inner = self.inner.lock().await;
        let before = inner.checkpoints.len();
        inner.checkpoints.retain(|cp| cp.checkpoint_id != checkpoint_id);
        Ok(inner.checkpoints.len() != before)
    }

    async fn cleanup_old_checkpoints(&self, keep_count: usize) -> Result<usize, CheckpointError> {
        let mut inner = self.inner.lock().await;
        if inner.checkpoints.len() <= keep_count {
            return Ok(0);
        }
        inner
            .checkpoints
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let removed = inner.checkpoints.len() - keep_count;
        inner.checkpoints.truncate(keep_count);
        Ok(removed)
    }
}
