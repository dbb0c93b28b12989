//! Checkpoint persistence for resumable analysis jobs
//!
//! A checkpoint is a full snapshot of a job's progress: which chunk indices
//! are done, their intermediate results, and an opaque session-state map.
//! Saves always rewrite the whole file; there is no append log and no file
//! locking, so a checkpoint path belongs to exactly one running job.

use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint_items, fingerprint_text, DatasetItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Persisted snapshot of an in-progress chunked job.
///
/// `processed_indices` is always a contiguous prefix `0..k`: the engine
/// completes chunks strictly in order, so no chunk is ever marked done while
/// an earlier one is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    /// Short random token identifying this snapshot.
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the dataset's identifier set, for resume validation.
    pub emails_hash: String,
    pub processed_indices: Vec<usize>,
    /// Results keyed by stringified chunk index, covering exactly
    /// `processed_indices`.
    pub intermediate_results: BTreeMap<String, String>,
    /// Opaque caller-supplied stats (token counts, call counts, ...).
    pub session_state: HashMap<String, Value>,
    pub total_chunks: usize,
    /// Prompt fingerprint; empty means prompt-agnostic validation.
    #[serde(default)]
    pub prompt_hash: String,
}

impl Checkpoint {
    /// Build a checkpoint with a fresh id and timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        emails_hash: String,
        prompt_hash: String,
        total_chunks: usize,
        processed_indices: Vec<usize>,
        intermediate_results: BTreeMap<String, String>,
        session_state: HashMap<String, Value>,
    ) -> Self {
        let checkpoint_id: String = uuid::Uuid::new_v4().to_string().chars().take(8).collect();
        Self {
            session_id,
            checkpoint_id,
            created_at: Utc::now(),
            emails_hash,
            processed_indices,
            intermediate_results,
            session_state,
            total_chunks,
            prompt_hash,
        }
    }

    /// Whether this checkpoint can seed a resume for the given dataset and
    /// prompt.
    ///
    /// The dataset fingerprint must match exactly. The prompt is checked only
    /// when the caller supplies one and the checkpoint stores a prompt hash;
    /// a checkpoint without a prompt hash validates against any prompt.
    pub fn is_valid_for<T: DatasetItem>(&self, dataset: &[T], prompt: Option<&str>) -> bool {
        if fingerprint_items(dataset) != self.emails_hash {
            return false;
        }

        if let Some(prompt) = prompt {
            if !self.prompt_hash.is_empty() && fingerprint_text(prompt) != self.prompt_hash {
                return false;
            }
        }

        true
    }

    /// Completion percentage, 0.0 for an empty job.
    pub fn progress_pct(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.processed_indices.len() as f64 / self.total_chunks as f64 * 100.0
    }
}

/// Summary of a checkpoint for status reporting, without the intermediate
/// results payload.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointInfo {
    pub session_id: String,
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    /// `"completed/total"` progress string.
    pub progress: String,
    pub progress_pct: f64,
    pub session_state: HashMap<String, Value>,
}

/// Disk store for [`Checkpoint`] snapshots, one JSON file per path.
#[derive(Debug, Default)]
pub struct CheckpointStore;

impl CheckpointStore {
    pub fn new() -> Self {
        Self
    }

    /// Persist a checkpoint, fully overwriting any prior content at `path`.
    pub async fn save(&self, checkpoint: &Checkpoint, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Temp file plus rename so a crash mid-write never leaves a
        // truncated checkpoint at the real path.
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, path).await?;

        info!(
            "Saved checkpoint {} for session {}: {}/{} chunks",
            checkpoint.checkpoint_id,
            checkpoint.session_id,
            checkpoint.processed_indices.len(),
            checkpoint.total_chunks
        );

        Ok(())
    }

    /// Load a checkpoint from `path`.
    ///
    /// Returns [`Error::CheckpointNotFound`] when the file is absent and
    /// [`Error::CheckpointCorrupted`] when it cannot be parsed. A corrupt
    /// file is moved aside to `<path>.corrupt` so the next save cannot
    /// destroy the evidence.
    pub async fn load(&self, path: &Path) -> Result<Checkpoint> {
        if !path.exists() {
            return Err(Error::CheckpointNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path).await?;
        match serde_json::from_str(&content) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(e) => {
                let quarantine = quarantine_path(path);
                warn!(
                    "Checkpoint at {} is corrupt, preserving as {}",
                    path.display(),
                    quarantine.display()
                );
                let _ = fs::rename(path, &quarantine).await;
                Err(Error::CheckpointCorrupted(
                    path.display().to_string(),
                    e.to_string(),
                ))
            }
        }
    }

    /// Read a checkpoint summary for status reporting.
    ///
    /// Returns `None` for missing or unreadable files; unlike [`load`] this
    /// never moves a corrupt file aside.
    ///
    /// [`load`]: CheckpointStore::load
    pub async fn info(&self, path: &Path) -> Option<CheckpointInfo> {
        let content = fs::read_to_string(path).await.ok()?;
        let checkpoint: Checkpoint = serde_json::from_str(&content).ok()?;

        Some(CheckpointInfo {
            progress: format!(
                "{}/{}",
                checkpoint.processed_indices.len(),
                checkpoint.total_chunks
            ),
            progress_pct: checkpoint.progress_pct(),
            session_id: checkpoint.session_id,
            checkpoint_id: checkpoint.checkpoint_id,
            created_at: checkpoint.created_at,
            session_state: checkpoint.session_state,
        })
    }

    /// Delete the checkpoint file if present. Returns whether anything was
    /// removed.
    pub async fn clear(&self, path: &Path) -> Result<bool> {
        if path.exists() {
            fs::remove_file(path).await?;
            debug!("Deleted checkpoint at {}", path.display());
            return Ok(true);
        }
        Ok(false)
    }
}

fn quarantine_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".corrupt");
    std::path::PathBuf::from(name)
}
