use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::types::*;
use crate::storage::{CheckpointError, CheckpointStore, build_checkpoint, next_timestamp};

const LATEST_FILE: &str = "latest.json";
const INDEX_FILE: &str = "index.json";

/// Manifest entry pointing a checkpoint id at its file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    #[serde(flatten)]
    summary: CheckpointSummary,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: Vec<IndexEntry>,
}

/// File-based checkpoint store. One directory per project holding versioned
/// JSON records, a `latest.json` mirror and an `index.json` manifest.
pub struct JsonCheckpointStore {
    project_id: String,
    project_dir: PathBuf,
    /// Serialises writers and remembers the last creation time handed out.
    last_created: RwLock<Option<DateTime<Utc>>>,
}

impl JsonCheckpointStore {
    pub fn new(root: impl AsRef<Path>, project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            project_dir: root.as_ref().join(sanitize(project_id)),
            last_created: RwLock::new(None),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn latest_path(&self) -> PathBuf {
        self.project_dir.join(LATEST_FILE)
    }

    fn index_path(&self) -> PathBuf {
        self.project_dir.join(INDEX_FILE)
    }

    fn file_name(checkpoint: &Checkpoint) -> String {
        let short = checkpoint
            .checkpoint_id
            .trim_start_matches("ckpt_")
            .chars()
            .take(8)
            .collect::<String>();
        format!(
            "checkpoint_v{}_{}_{}.json",
            checkpoint.version,
            checkpoint.created_at.format("%Y%m%dT%H%M%S%.6fZ"),
            short
        )
    }

    fn is_versioned_file(name: &str) -> bool {
        name.starts_with("checkpoint_") && name.ends_with(".json")
    }

    async fn write_atomic(path: &Path, data: &str) -> Result<(), CheckpointError> {
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, data)
            .await
            .map_err(|e| CheckpointError::io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| CheckpointError::io(path, e))?;
        Ok(())
    }

    async fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CheckpointError::io(path, e))?;
        serde_json::from_str(&data).map_err(|e| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Names of all versioned record files currently on disk.
    async fn versioned_files(&self) -> Result<HashSet<String>, CheckpointError> {
        let mut names = HashSet::new();
        if !self.project_dir.exists() {
            return Ok(names);
        }

        let mut entries = tokio::fs::read_dir(&self.project_dir)
            .await
            .map_err(|e| CheckpointError::io(&self.project_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CheckpointError::io(&self.project_dir, e))?
        {
            if let Some(name) = entry.file_name().to_str()
                && Self::is_versioned_file(name)
            {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    /// Parse every versioned record. Unreadable records are skipped.
    async fn scan(&self) -> Result<Vec<IndexEntry>, CheckpointError> {
        let mut found = Vec::new();
        for name in self.versioned_files().await? {
            let path = self.project_dir.join(&name);
            match Self::read_checkpoint(&path).await {
                Ok(checkpoint) => found.push(IndexEntry {
                    file: name,
                    summary: checkpoint.summary(),
                }),
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }
        Ok(found)
    }

    async fn read_index(&self) -> Option<Vec<IndexEntry>> {
        let path = self.index_path();
        let data = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<Index>(&data) {
            Ok(index) => Some(index.entries),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Ignoring corrupt checkpoint index");
                None
            }
        }
    }

    /// Persist the manifest. A failed write drops the index so the next listing rebuilds it.
    async fn write_index(&self, entries: Vec<IndexEntry>) {
        let path = self.index_path();
        let result = match serde_json::to_string_pretty(&Index { entries }) {
            Ok(data) => Self::write_atomic(&path, &data).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(file = %path.display(), error = %e, "Failed to write checkpoint index");
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    /// Manifest entries matching the files on disk, rebuilt from a scan when stale.
    async fn current_index(&self) -> Result<Vec<IndexEntry>, CheckpointError> {
        let on_disk = self.versioned_files().await?;
        if let Some(entries) = self.read_index().await {
            let indexed: HashSet<&str> = entries.iter().map(|e| e.file.as_str()).collect();
            if indexed.len() == on_disk.len() && on_disk.iter().all(|f| indexed.contains(f.as_str()))
            {
                return Ok(entries);
            }
        }

        if on_disk.is_empty() {
            return Ok(Vec::new());
        }

        debug!(dir = %self.project_dir.display(), "Rebuilding checkpoint index");
        let entries = self.scan().await?;
        self.write_index(entries.clone()).await;
        Ok(entries)
    }

    async fn find_by_id(&self, checkpoint_id: &str) -> Result<Option<(PathBuf, Checkpoint)>, CheckpointError> {
        if let Some(entries) = self.read_index().await
            && let Some(entry) = entries.iter().find(|e| e.summary.checkpoint_id == checkpoint_id)
        {
            let path = self.project_dir.join(&entry.file);
            match Self::read_checkpoint(&path).await {
                Ok(cp) if cp.checkpoint_id == checkpoint_id => return Ok(Some((path, cp))),
                Ok(_) => warn!(file = %path.display(), "Index entry points at a different checkpoint"),
                Err(e) => warn!(file = %path.display(), error = %e, "Indexed checkpoint unreadable"),
            }
        }

        for name in self.versioned_files().await? {
            let path = self.project_dir.join(&name);
            match Self::read_checkpoint(&path).await {
                Ok(cp) if cp.checkpoint_id == checkpoint_id => return Ok(Some((path, cp))),
                Ok(_) => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }
        Ok(None)
    }

    /// Creation time recorded in `latest.json`, if readable.
    async fn latest_created_at(&self) -> Option<DateTime<Utc>> {
        Self::read_checkpoint(&self.latest_path())
            .await
            .ok()
            .map(|cp| cp.created_at)
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
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
        let mut last_created = self.last_created.write().await;

        tokio::fs::create_dir_all(&self.project_dir)
            .await
            .map_err(|e| CheckpointError::io(&self.project_dir, e))?;

        if last_created.is_none() {
            *last_created = self.latest_created_at().await;
        }
        let created_at = next_timestamp(*last_created);

        let checkpoint = build_checkpoint(
            &self.project_id,
            session_id,
            state,
            checkpoint_type,
            metadata,
            created_at,
        )?;
        let data = serde_json::to_string_pretty(&checkpoint)?;
        let file = Self::file_name(&checkpoint);

        // Versioned record first: a crash before `latest` leaves it one behind, never ahead.
        Self::write_atomic(&self.project_dir.join(&file), &data).await?;
        Self::write_atomic(&self.latest_path(), &data).await?;
        *last_created = Some(created_at);

        if let Some(mut entries) = self.read_index().await {
            entries.push(IndexEntry {
                file: file.clone(),
                summary: checkpoint.summary(),
            });
            self.write_index(entries).await;
        }

        info!(
            project = %self.project_id,
            checkpoint = %checkpoint.checkpoint_id,
            kind = %checkpoint_type,
            "Checkpoint saved"
        );

        Ok(checkpoint.checkpoint_id)
    }

    async fn load(
        &self,
        checkpoint_id: Option<&str>,
    ) -> Result<Option<LoadedCheckpoint>, CheckpointError> {
        let _lock = self.last_created.read().await;

        let checkpoint = match checkpoint_id {
            None => {
                let path = self.latest_path();
                if !path.exists() {
                    return Ok(None);
                }
                Self::read_checkpoint(&path).await?
            }
            Some(id) => match self.find_by_id(id).await? {
                Some((_, cp)) => cp,
                None => return Ok(None),
            },
        };

        if checkpoint.project_id != self.project_id {
            warn!(
                checkpoint = %checkpoint.checkpoint_id,
                found = %checkpoint.project_id,
                expected = %self.project_id,
                "Ignoring checkpoint from another project"
            );
            return Ok(None);
        }

        let loaded = LoadedCheckpoint::new(checkpoint);
        if loaded.version_mismatch {
            warn!(
                checkpoint = %loaded.checkpoint.checkpoint_id,
                found = loaded.checkpoint.version,
                expected = CHECKPOINT_VERSION,
                "Checkpoint schema version differs"
            );
        }
        Ok(Some(loaded))
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let _lock = self.last_created.read().await;

        let mut summaries: Vec<CheckpointSummary> = self
            .current_index()
            .await?
            .into_iter()
            .map(|e| e.summary)
            .collect();

        // Newest first
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        let _lock = self.last_created.write().await;

        let Some((path, _)) = self.find_by_id(checkpoint_id).await? else {
            return Ok(false);
        };
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| CheckpointError::io(&path, e))?;

        if let Some(mut entries) = self.read_index().await {
            entries.retain(|e| e.summary.checkpoint_id != checkpoint_id);
            self.write_index(entries).await;
        }

        info!(project = %self.project_id, checkpoint = %checkpoint_id, "Checkpoint deleted");
        Ok(true)
    }

    async fn cleanup_old_checkpoints(&self, keep_count: usize) -> Result<usize, CheckpointError> {
        let _lock = self.last_created.write().await;

        let mut entries = self.current_index().await?;
        if entries.len() <= keep_count {
            return Ok(0);
        }

        entries.sort_by(|a, b| b.summary.created_at.cmp(&a.summary.created_at));
        let stale = entries.split_off(keep_count);

        let mut removed = 0;
        for entry in &stale {
            let path = self.project_dir.join(&entry.file);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    // Manifest no longer matches the directory; force a rebuild
                    let _ = tokio::fs::remove_file(self.index_path()).await;
                    return Err(CheckpointError::io(&path, e));
                }
            }
        }

        self.write_index(entries).await;
        info!(project = %self.project_id, removed, kept = keep_count, "Pruned old checkpoints");
        Ok(removed)
    }
}

/// Map a project id onto a safe directory name. Ids that had to be rewritten
/// carry a digest of the raw id so distinct projects never share a directory.
fn sanitize(project_id: &str) -> String {
    let cleaned: String = project_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let unsafe_name = cleaned.is_empty() || cleaned.chars().all(|c| c == '.');
    if !unsafe_name && cleaned == project_id {
        return cleaned;
    }

    let digest = hex::encode(Sha256::digest(project_id.as_bytes()));
    let base = if unsafe_name { "_" } else { cleaned.as_str() };
    format!("{}-{}", base, &digest[..8])
}
