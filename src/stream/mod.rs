//! Incremental output streams: chunk types, pure operators, composition and
//! checkpoint/resume persistence.

pub mod compose;
pub mod persist;
pub mod transform;

use crate::core::errors::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item of incremental action output.
///
/// Positions are assigned by the producer, strictly increasing from 0;
/// checkpointing and resume skipping are defined over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub position: u64,
    pub data: Value,
}

impl StreamChunk {
    pub fn new(position: u64, data: Value) -> Self {
        Self { position, data }
    }
}

/// An identified, ordered, at-most-once-consumed sequence of chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Output of the `batch` operator and of `zip` rounds.
pub type ChunkBatchStream = BoxStream<'static, Result<Vec<StreamChunk>>>;

/// Fresh stream identity, independent of the producing task.
pub fn new_stream_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Convenience for tests and single-shot adapters: a finite stream from
/// in-memory values, positions assigned in order.
pub fn from_values(values: Vec<Value>) -> ChunkStream {
    use futures::StreamExt;
    futures::stream::iter(
        values
            .into_iter()
            .enumerate()
            .map(|(i, data)| Ok(StreamChunk::new(i as u64, data))),
    )
    .boxed()
}
