//! Pure operators over chunk streams.
//!
//! Every operator is lazy and preserves streaming semantics: nothing buffers
//! the whole source before producing its first output. `batch` is the one
//! explicitly stateful operator and buffers at most `size` items.

use crate::core::errors::{EngineError, Result};
use crate::stream::{ChunkBatchStream, ChunkStream, StreamChunk};
use futures::stream;
use futures::StreamExt;
use serde_json::Value;

/// Apply `f` to each chunk's data, preserving positions. An error from `f`
/// terminates the stream with that error; nothing after it is yielded.
pub fn map<F>(source: ChunkStream, f: F) -> ChunkStream
where
    F: FnMut(Value) -> Result<Value> + Send + 'static,
{
    stream::unfold(
        (source, f, false),
        |(mut source, mut f, done)| async move {
            if done {
                return None;
            }
            match source.next().await {
                None => None,
                Some(Ok(chunk)) => match f(chunk.data) {
                    Ok(data) => Some((
                        Ok(StreamChunk::new(chunk.position, data)),
                        (source, f, false),
                    )),
                    Err(err) => Some((Err(err), (source, f, true))),
                },
                Some(Err(err)) => Some((Err(err), (source, f, true))),
            }
        },
    )
    .boxed()
}

/// Keep only chunks for which `predicate` returns true. Positions are
/// preserved, so filtered streams stay checkpointable against the source.
/// A predicate error terminates the stream with that error.
pub fn filter<P>(source: ChunkStream, predicate: P) -> ChunkStream
where
    P: FnMut(&Value) -> Result<bool> + Send + 'static,
{
    stream::unfold(
        (source, predicate, false),
        |(mut source, mut predicate, done)| async move {
            if done {
                return None;
            }
            loop {
                match source.next().await {
                    None => return None,
                    Some(Ok(chunk)) => match predicate(&chunk.data) {
                        Ok(true) => return Some((Ok(chunk), (source, predicate, false))),
                        Ok(false) => continue,
                        Err(err) => return Some((Err(err), (source, predicate, true))),
                    },
                    Some(Err(err)) => return Some((Err(err), (source, predicate, true))),
                }
            }
        },
    )
    .boxed()
}

/// Group chunks into batches of `size`, flushing a final partial batch when
/// the source ends. If the source errors, the buffered partial batch is
/// flushed first, then the error is surfaced and the stream ends.
pub fn batch(source: ChunkStream, size: usize) -> ChunkBatchStream {
    assert!(size > 0, "batch size must be at least 1");

    enum BatchState {
        Reading(ChunkStream, Vec<StreamChunk>),
        Erroring(EngineError),
        Done,
    }

    stream::unfold(
        BatchState::Reading(source, Vec::with_capacity(size)),
        move |state| async move {
            match state {
                BatchState::Done => None,
                BatchState::Erroring(err) => Some((Err(err), BatchState::Done)),
                BatchState::Reading(mut source, mut buffer) => loop {
                    match source.next().await {
                        Some(Ok(chunk)) => {
                            buffer.push(chunk);
                            if buffer.len() >= size {
                                let full = std::mem::replace(
                                    &mut buffer,
                                    Vec::with_capacity(size),
                                );
                                return Some((Ok(full), BatchState::Reading(source, buffer)));
                            }
                        }
                        Some(Err(err)) => {
                            if buffer.is_empty() {
                                return Some((Err(err), BatchState::Done));
                            }
                            return Some((Ok(buffer), BatchState::Erroring(err)));
                        }
                        None => {
                            if buffer.is_empty() {
                                return None;
                            }
                            return Some((Ok(buffer), BatchState::Done));
                        }
                    }
                },
            }
        },
    )
    .boxed()
}
