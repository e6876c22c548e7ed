//! Checkpoint/resume persistence for long-running streams.
//!
//! Streams are addressed by stream id, independent of the task producing
//! them. A checkpoint records how far a stream has been delivered; resume
//! regenerates the stream from its factory and skips everything at or before
//! the checkpointed position, exactly once.

use crate::core::errors::{EngineError, Result};
use crate::stream::ChunkStream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Durable marker of how much of a stream has been produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stream_id: String,
    pub position: u64,
    pub state: Value,
    pub timestamp: DateTime<Utc>,
}

/// Key/value storage abstraction the persistence layer writes through.
///
/// A `put` must be durable before it returns; the engine acknowledges a
/// checkpoint only once the store has.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Sled-backed store; flushes after every write for durability.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl CheckpointStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db.insert(key, value)?;
        self.db
            .flush_async()
            .await
            .map_err(|e| EngineError::storage("sled_flush", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.db.remove(key)?.is_some();
        self.db
            .flush_async()
            .await
            .map_err(|e| EngineError::storage("sled_flush", e))?;
        Ok(existed)
    }
}

/// In-memory store for tests and ephemeral engines.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

fn checkpoint_key(stream_id: &str) -> String {
    format!("checkpoint/{stream_id}")
}

/// Checkpoint writer/reader plus resume logic. Single writer per stream id;
/// concurrent attempts for the same stream are the caller's to prevent.
#[derive(Clone)]
pub struct StreamPersistence {
    store: Arc<dyn CheckpointStore>,
    /// Auto-checkpoint every N yielded items on a resumed stream.
    interval: usize,
}

impl StreamPersistence {
    pub fn new(store: Arc<dyn CheckpointStore>, interval: usize) -> Self {
        Self { store, interval }
    }

    /// Write a checkpoint. Idempotent for equal positions; a write below the
    /// stored position is rejected so positions never regress.
    pub async fn checkpoint(&self, stream_id: &str, position: u64, state: Value) -> Result<()> {
        if let Some(existing) = self.last_checkpoint(stream_id).await? {
            if position < existing.position {
                return Err(EngineError::validation_field(
                    format!(
                        "checkpoint position {position} regresses below {} for stream {stream_id}",
                        existing.position
                    ),
                    "position",
                ));
            }
            if position == existing.position {
                debug!(stream_id, position, "checkpoint already stored");
                return Ok(());
            }
        }

        let checkpoint = Checkpoint {
            stream_id: stream_id.to_string(),
            position,
            state,
            timestamp: Utc::now(),
        };
        let bytes = serde_json::to_vec(&checkpoint)?;
        self.store.put(&checkpoint_key(stream_id), bytes).await?;
        debug!(stream_id, position, "checkpoint written");
        Ok(())
    }

    /// Most recent checkpoint for a stream, if any.
    pub async fn last_checkpoint(&self, stream_id: &str) -> Result<Option<Checkpoint>> {
        match self.store.get(&checkpoint_key(stream_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Drop a stream's checkpoint (after the stream completes).
    pub async fn delete(&self, stream_id: &str) -> Result<bool> {
        self.store.delete(&checkpoint_key(stream_id)).await
    }

    /// Re-create a stream from its factory, skip chunks at or before the
    /// last checkpoint, and resume periodic checkpointing from there.
    ///
    /// Auto-checkpoint failures are logged and do not interrupt delivery;
    /// the worst case is a longer replay on the next resume.
    pub async fn resume<F>(&self, stream_id: &str, stream_factory: F) -> Result<ChunkStream>
    where
        F: FnOnce() -> ChunkStream,
    {
        let resume_after = self
            .last_checkpoint(stream_id)
            .await?
            .map(|cp| cp.position);
        let source = stream_factory();

        struct ResumeState {
            source: ChunkStream,
            persistence: StreamPersistence,
            stream_id: String,
            resume_after: Option<u64>,
            yielded: usize,
            done: bool,
        }

        let interval = self.interval;
        let state = ResumeState {
            source,
            persistence: self.clone(),
            stream_id: stream_id.to_string(),
            resume_after,
            yielded: 0,
            done: false,
        };

        Ok(stream::unfold(state, move |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match state.source.next().await {
                    None => return None,
                    Some(Err(err)) => {
                        state.done = true;
                        return Some((Err(err), state));
                    }
                    Some(Ok(chunk)) => {
                        if state.resume_after.is_some_and(|p| chunk.position <= p) {
                            continue;
                        }
                        state.yielded += 1;
                        if state.yielded % interval == 0 {
                            if let Err(err) = state
                                .persistence
                                .checkpoint(&state.stream_id, chunk.position, Value::Null)
                                .await
                            {
                                warn!(
                                    stream_id = %state.stream_id,
                                    position = chunk.position,
                                    error = %err,
                                    "periodic checkpoint failed"
                                );
                            }
                        }
                        return Some((Ok(chunk), state));
                    }
                }
            }
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::from_values;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn persistence(interval: usize) -> StreamPersistence {
        StreamPersistence::new(Arc::new(MemoryStore::new()), interval)
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let p = persistence(100);
        p.checkpoint("s1", 42, json!({"cursor": "abc"}))
            .await
            .unwrap();

        let cp = p.last_checkpoint("s1").await.unwrap().unwrap();
        assert_eq!(cp.position, 42);
        assert_eq!(cp.state, json!({"cursor": "abc"}));
        assert!(p.last_checkpoint("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_rejects_regression() {
        let p = persistence(100);
        p.checkpoint("s1", 10, Value::Null).await.unwrap();
        // Idempotent at the same position.
        p.checkpoint("s1", 10, Value::Null).await.unwrap();
        // Regression rejected.
        let err = p.checkpoint("s1", 9, Value::Null).await.unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(p.last_checkpoint("s1").await.unwrap().unwrap().position, 10);
    }

    #[tokio::test]
    async fn test_resume_skips_through_checkpoint_exactly_once() {
        let p = persistence(100);
        p.checkpoint("s1", 4, Value::Null).await.unwrap();

        let resumed = p
            .resume("s1", || from_values((0..10).map(|i| json!(i)).collect()))
            .await
            .unwrap();
        let positions: Vec<_> = resumed
            .map(|r| r.unwrap().position)
            .collect::<Vec<_>>()
            .await;

        assert_eq!(positions, vec![5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_replays_everything() {
        let p = persistence(100);
        let resumed = p
            .resume("fresh", || from_values((0..3).map(|i| json!(i)).collect()))
            .await
            .unwrap();
        let positions: Vec<_> = resumed
            .map(|r| r.unwrap().position)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_resume_checkpoints_periodically() {
        let p = persistence(3);
        let resumed = p
            .resume("s1", || from_values((0..10).map(|i| json!(i)).collect()))
            .await
            .unwrap();
        let _ = resumed.collect::<Vec<_>>().await;

        // 10 items, interval 3: checkpoints after items 3, 6, 9 (positions 2, 5, 8).
        let cp = p.last_checkpoint("s1").await.unwrap().unwrap();
        assert_eq!(cp.position, 8);
    }

    #[tokio::test]
    async fn test_resume_then_resume_again_has_no_gap_or_duplicate() {
        let p = persistence(3);
        let make = || from_values((0..10).map(|i| json!(i)).collect());

        // Consume only part of the first resume by taking 7 items.
        let first = p.resume("s1", make).await.unwrap();
        let consumed: Vec<_> = first.take(7).map(|r| r.unwrap().position).collect().await;
        assert_eq!(consumed, vec![0, 1, 2, 3, 4, 5, 6]);

        // Last checkpoint was written at position 5 (6th item).
        let second = p.resume("s1", make).await.unwrap();
        let rest: Vec<_> = second.map(|r| r.unwrap().position).collect().await;
        assert_eq!(rest, vec![6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_delete_checkpoint() {
        let p = persistence(100);
        p.checkpoint("s1", 1, Value::Null).await.unwrap();
        assert!(p.delete("s1").await.unwrap());
        assert!(!p.delete("s1").await.unwrap());
        assert!(p.last_checkpoint("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.put("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
