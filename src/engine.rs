//! Resumable sequential map over chunked datasets
//!
//! The engine drives a per-chunk processing call strictly in index order,
//! persisting a checkpoint every `checkpoint_interval` completed chunks and
//! at the end of the run. On start it consults the checkpoint path: a valid
//! prior checkpoint seeds the result map and moves the start index past the
//! completed prefix; a missing, corrupt, or mismatched checkpoint downgrades
//! to a fresh run with a logged notice, never an error.
//!
//! Processing is sequential by design, not an oversight: checkpoint validity
//! rests on the completed indices forming a contiguous prefix, which only
//! holds when chunk N+1 never starts before chunk N finishes.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint_items, fingerprint_text, DatasetItem};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// The remote model call, treated as an opaque black box.
///
/// Implementations own retry and timeout policy; the engine never retries. An
/// error from `process` is fatal to the run and propagates to the caller,
/// leaving the last written checkpoint on disk as the recovery point.
#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    async fn process(
        &self,
        prompt: &str,
        context: &str,
        params: &HashMap<String, Value>,
    ) -> Result<String>;
}

/// Engine configuration for one job.
#[derive(Debug, Clone)]
pub struct MapOptions {
    /// Where to read/write the checkpoint. `None` disables checkpointing.
    pub checkpoint_path: Option<PathBuf>,
    /// Save a checkpoint every N completed chunks. 0 is treated as 1.
    pub checkpoint_interval: usize,
    /// Extra parameters forwarded verbatim to the processing call.
    pub params: HashMap<String, Value>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            checkpoint_path: None,
            checkpoint_interval: 10,
            params: HashMap::new(),
        }
    }
}

/// Optional per-run callbacks.
#[derive(Default)]
pub struct MapHooks {
    /// Supplies the session-state snapshot embedded in each checkpoint. A
    /// `"session_id"` string entry, if present, names the session.
    pub session_state_fn: Option<Box<dyn Fn() -> HashMap<String, Value> + Send + Sync>>,
    /// Fire-and-forget progress callback `(completed, total)`.
    pub on_progress: Option<Box<dyn Fn(usize, usize) + Send + Sync>>,
}

/// Outcome of a map run.
#[derive(Debug)]
pub struct MapOutcome {
    /// Results aligned 1:1 with the input chunk order.
    pub results: Vec<String>,
    /// Index processing resumed at, when a valid checkpoint was found.
    pub resumed_from: Option<usize>,
}

/// Sequential chunk executor with checkpoint/resume support.
pub struct ResumableMapEngine {
    processor: Arc<dyn ChunkProcessor>,
    store: CheckpointStore,
    options: MapOptions,
}

impl ResumableMapEngine {
    pub fn new(processor: Arc<dyn ChunkProcessor>) -> Self {
        Self::with_options(processor, MapOptions::default())
    }

    pub fn with_options(processor: Arc<dyn ChunkProcessor>, options: MapOptions) -> Self {
        Self {
            processor,
            store: CheckpointStore::new(),
            options,
        }
    }

    /// Map `prompt` over `chunks` in order, checkpointing periodically.
    ///
    /// `dataset` is the original item sequence the chunks were cut from; its
    /// identifier fingerprint decides whether a prior checkpoint is still
    /// valid. An empty chunk sequence returns an empty result list and
    /// performs no checkpoint I/O.
    pub async fn map_chunks<C, E>(
        &self,
        prompt: &str,
        chunks: &[C],
        context_fn: impl Fn(&C) -> String,
        dataset: &[E],
        hooks: &MapHooks,
    ) -> Result<MapOutcome>
    where
        E: DatasetItem,
    {
        let total = chunks.len();
        if total == 0 {
            return Ok(MapOutcome {
                results: Vec::new(),
                resumed_from: None,
            });
        }

        let interval = self.options.checkpoint_interval.max(1);
        let mut results: BTreeMap<usize, String> = BTreeMap::new();
        let mut start_idx = 0;
        let mut session_id = String::from("unknown");
        let mut resumed_from = None;

        if let Some(path) = &self.options.checkpoint_path {
            if path.exists() {
                match self.store.load(path).await {
                    Ok(checkpoint) => {
                        if checkpoint.is_valid_for(dataset, Some(prompt)) {
                            for (key, value) in &checkpoint.intermediate_results {
                                if let Ok(idx) = key.parse::<usize>() {
                                    results.insert(idx, value.clone());
                                }
                            }
                            start_idx = checkpoint.processed_indices.len();
                            session_id = checkpoint.session_id.clone();
                            resumed_from = Some(start_idx);
                            info!(
                                "Resuming from checkpoint: {}/{} completed ({:.1}%)",
                                start_idx,
                                total,
                                checkpoint.progress_pct()
                            );
                        } else {
                            warn!("Checkpoint invalid for current data, starting fresh");
                        }
                    }
                    Err(e) => {
                        warn!("Could not load checkpoint: {e}, starting fresh");
                    }
                }
            }
        }

        if session_id == "unknown" {
            if let Some(state_fn) = &hooks.session_state_fn {
                if let Some(Value::String(id)) = state_fn().get("session_id") {
                    session_id = id.clone();
                }
            }
        }

        let emails_hash = fingerprint_items(dataset);
        let prompt_hash = fingerprint_text(prompt);

        for i in start_idx..total {
            let context = context_fn(&chunks[i]);
            let result = self
                .processor
                .process(prompt, &context, &self.options.params)
                .await?;
            results.insert(i, result);

            if let Some(on_progress) = &hooks.on_progress {
                on_progress(i + 1, total);
            }

            if let Some(path) = &self.options.checkpoint_path {
                if (i + 1) % interval == 0 || i == total - 1 {
                    let session_state = hooks
                        .session_state_fn
                        .as_ref()
                        .map(|f| f())
                        .unwrap_or_default();
                    let intermediate = results
                        .iter()
                        .map(|(idx, text)| (idx.to_string(), text.clone()))
                        .collect();
                    let checkpoint = Checkpoint::new(
                        session_id.clone(),
                        emails_hash.clone(),
                        prompt_hash.clone(),
                        total,
                        (0..=i).collect(),
                        intermediate,
                        session_state,
                    );
                    self.store.save(&checkpoint, path).await?;
                }
            }
        }

        let ordered = (0..total)
            .map(|i| {
                results
                    .remove(&i)
                    .ok_or_else(|| Error::Processing(format!("missing result for chunk {i}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MapOutcome {
            results: ordered,
            resumed_from,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct EchoProcessor {
        calls: AtomicUsize,
    }

    impl EchoProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChunkProcessor for EchoProcessor {
        async fn process(
            &self,
            _prompt: &str,
            context: &str,
            _params: &HashMap<String, Value>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("R{context}"))
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl ChunkProcessor for FailingProcessor {
        async fn process(
            &self,
            _prompt: &str,
            _context: &str,
            _params: &HashMap<String, Value>,
        ) -> Result<String> {
            Err(Error::Processing("model unavailable".to_string()))
        }
    }

    fn dataset(n: usize) -> Vec<EmailRecord> {
        (0..n)
            .map(|i| EmailRecord {
                id: Some(format!("msg-{i}")),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_follow_chunk_order() {
        let processor = EchoProcessor::new();
        let engine = ResumableMapEngine::new(processor.clone());
        let data = dataset(3);
        let chunks = vec![0usize, 1, 2];

        let outcome = engine
            .map_chunks("p", &chunks, |c| c.to_string(), &data, &MapHooks::default())
            .await
            .unwrap();

        assert_eq!(outcome.results, vec!["R0", "R1", "R2"]);
        assert_eq!(outcome.resumed_from, None);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input_does_no_io() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.checkpoint");
        let engine = ResumableMapEngine::with_options(
            EchoProcessor::new(),
            MapOptions {
                checkpoint_path: Some(path.clone()),
                ..Default::default()
            },
        );

        let chunks: Vec<usize> = Vec::new();
        let outcome = engine
            .map_chunks(
                "p",
                &chunks,
                |c| c.to_string(),
                &dataset(0),
                &MapHooks::default(),
            )
            .await
            .unwrap();

        assert!(outcome.results.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_periodic_checkpoint_covers_prefix() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.checkpoint");
        let engine = ResumableMapEngine::with_options(
            EchoProcessor::new(),
            MapOptions {
                checkpoint_path: Some(path.clone()),
                checkpoint_interval: 2,
                ..Default::default()
            },
        );
        let data = dataset(5);
        let chunks = vec![0usize, 1, 2, 3, 4];

        engine
            .map_chunks("p", &chunks, |c| c.to_string(), &data, &MapHooks::default())
            .await
            .unwrap();

        let store = CheckpointStore::new();
        let final_cp = store.load(&path).await.unwrap();
        assert_eq!(final_cp.processed_indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(final_cp.total_chunks, 5);
        assert_eq!(final_cp.intermediate_results.len(), 5);
        assert_eq!(final_cp.intermediate_results.get("4").unwrap(), "R4");
    }

    #[tokio::test]
    async fn test_progress_callback_counts_up() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_in_hook = seen.clone();
        let hooks = MapHooks {
            on_progress: Some(Box::new(move |done, total| {
                seen_in_hook.lock().unwrap().push((done, total));
            })),
            ..Default::default()
        };

        let engine = ResumableMapEngine::new(EchoProcessor::new());
        let data = dataset(3);
        engine
            .map_chunks("p", &[0usize, 1, 2], |c| c.to_string(), &data, &hooks)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_session_state_embedded_in_checkpoint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.checkpoint");
        let engine = ResumableMapEngine::with_options(
            EchoProcessor::new(),
            MapOptions {
                checkpoint_path: Some(path.clone()),
                ..Default::default()
            },
        );
        let hooks = MapHooks {
            session_state_fn: Some(Box::new(|| {
                HashMap::from([
                    ("session_id".to_string(), Value::from("rlm-42")),
                    ("total_tokens".to_string(), Value::from(1234)),
                ])
            })),
            ..Default::default()
        };

        let data = dataset(2);
        engine
            .map_chunks("p", &[0usize, 1], |c| c.to_string(), &data, &hooks)
            .await
            .unwrap();

        let checkpoint = CheckpointStore::new().load(&path).await.unwrap();
        assert_eq!(checkpoint.session_id, "rlm-42");
        assert_eq!(
            checkpoint.session_state.get("total_tokens").unwrap(),
            &Value::from(1234)
        );
    }

    #[tokio::test]
    async fn test_processing_failure_propagates() {
        let engine = ResumableMapEngine::new(Arc::new(FailingProcessor));
        let data = dataset(2);

        let err = engine
            .map_chunks(
                "p",
                &[0usize, 1],
                |c| c.to_string(),
                &data,
                &MapHooks::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Processing(_)));
    }

    #[tokio::test]
    async fn test_interval_zero_treated_as_one() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.checkpoint");
        let engine = ResumableMapEngine::with_options(
            EchoProcessor::new(),
            MapOptions {
                checkpoint_path: Some(path.clone()),
                checkpoint_interval: 0,
                ..Default::default()
            },
        );

        let data = dataset(1);
        engine
            .map_chunks("p", &[0usize], |c| c.to_string(), &data, &MapHooks::default())
            .await
            .unwrap();

        assert!(path.exists());
    }
}
