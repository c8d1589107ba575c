use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::engine::types::Metadata;
use crate::recorder::ProjectRecorder;

#[derive(Serialize)]
struct JournalEntry<'a> {
    kind: &'static str,
    project_id: &'a str,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capability: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a serde_json::Value>,
    metadata: &'a Metadata,
    recorded_at: String,
}

/// Append-only JSON-lines journal standing in for the business database.
pub struct JournalRecorder {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JournalRecorder {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &JournalEntry<'_>) -> Result<bool> {
        let _lock = self.lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to journal: {}", self.path.display()))?;
        file.flush().await?;

        Ok(true)
    }
}

#[async_trait]
impl ProjectRecorder for JournalRecorder {
    async fn record_milestone(
        &self,
        project_id: &str,
        session_id: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<bool> {
        self.append(&JournalEntry {
            kind: "milestone",
            project_id,
            session_id,
            name: Some(name),
            capability: None,
            artifact_type: None,
            data: None,
            metadata,
            recorded_at: Utc::now().to_rfc3339(),
        })
        .await
    }

    async fn update_metadata(
        &self,
        project_id: &str,
        session_id: &str,
        metadata: &Metadata,
    ) -> Result<bool> {
        self.append(&JournalEntry {
            kind: "metadata",
            project_id,
            session_id,
            name: None,
            capability: None,
            artifact_type: None,
            data: None,
            metadata,
            recorded_at: Utc::now().to_rfc3339(),
        })
        .await
    }

    async fn record_artifact(
        &self,
        project_id: &str,
        session_id: &str,
        capability: &str,
        artifact_type: &str,
        data: &serde_json::Value,
        metadata: &Metadata,
    ) -> Result<bool> {
        self.append(&JournalEntry {
            kind: "artifact",
            project_id,
            session_id,
            name: None,
            capability: Some(capability),
            artifact_type: Some(artifact_type),
            data: Some(data),
            metadata,
            recorded_at: Utc::now().to_rfc3339(),
        })
        .await
    }
}
