pub mod journal;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::engine::types::Metadata;

/// Business-level persistence that receives notifications from the workflow core.
///
/// Every call is best-effort from the caller's side: a failure is logged and
/// never reverses the local change that triggered it.
#[async_trait]
pub trait ProjectRecorder: Send + Sync {
    /// Record that a workflow step finished.
    async fn record_milestone(
        &self,
        project_id: &str,
        session_id: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<bool>;

    /// Attach or replace session-level metadata.
    async fn update_metadata(
        &self,
        project_id: &str,
        session_id: &str,
        metadata: &Metadata,
    ) -> Result<bool>;

    /// Store an artifact produced by a capability run.
    async fn record_artifact(
        &self,
        project_id: &str,
        session_id: &str,
        capability: &str,
        artifact_type: &str,
        data: &serde_json::Value,
        metadata: &Metadata,
    ) -> Result<bool>;
}

/// Recorder that accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

#[async_trait]
impl ProjectRecorder for NullRecorder {
    async fn record_milestone(&self, _: &str, _: &str, _: &str, _: &Metadata) -> Result<bool> {
        Ok(true)
    }

    async fn update_metadata(&self, _: &str, _: &str, _: &Metadata) -> Result<bool> {
        Ok(true)
    }

    async fn record_artifact(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &str,
        _: &serde_json::Value,
        _: &Metadata,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Log the outcome of a best-effort recorder call. Returns whether it was accepted.
pub fn log_outcome(operation: &str, outcome: Result<bool>) -> bool {
    match outcome {
        Ok(true) => {
            debug!(operation, "Recorder notified");
            true
        }
        Ok(false) => {
            warn!(operation, "Recorder rejected notification");
            false
        }
        Err(e) => {
            warn!(operation, error = %format!("{:#}", e), "Recorder notification failed");
            false
        }
    }
}
