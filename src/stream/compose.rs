//! Composition of multiple chunk streams.
//!
//! `merge` interleaves sources in arrival order with a bounded number of
//! in-flight chunks per source; `zip` yields lock-step rounds and ends at
//! the shortest source. Per-source chunk order is always preserved; merge
//! makes no ordering promise across sources.

use crate::core::errors::Result;
use crate::stream::{ChunkBatchStream, ChunkStream, StreamChunk};
use futures::stream::{self, SelectAll};
use futures::StreamExt;
use tokio::sync::mpsc;

/// A merged chunk tagged with the index of the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChunk {
    pub source: usize,
    pub chunk: StreamChunk,
}

/// Interleave chunks from all sources as they become ready.
///
/// Each source is drained by a forwarding task into a bounded channel of
/// `per_source_bound` slots; a fast producer blocks on its own channel once
/// full, so no source can grow memory past its bound while the consumer is
/// slow. A source error is forwarded in order and ends that source; the
/// merged stream ends when every source is exhausted.
pub fn merge(
    sources: Vec<ChunkStream>,
    per_source_bound: usize,
) -> futures::stream::BoxStream<'static, Result<SourceChunk>> {
    assert!(per_source_bound > 0, "per-source bound must be at least 1");

    let mut merged: SelectAll<futures::stream::BoxStream<'static, Result<SourceChunk>>> =
        SelectAll::new();

    for (index, mut source) in sources.into_iter().enumerate() {
        let (tx, rx) = mpsc::channel::<Result<StreamChunk>>(per_source_bound);

        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let is_err = item.is_err();
                if tx.send(item).await.is_err() {
                    // Consumer dropped the merged stream; stop reading.
                    break;
                }
                if is_err {
                    break;
                }
            }
        });

        let tagged = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .map(move |item| item.map(|chunk| SourceChunk { source: index, chunk }))
        .boxed();

        merged.push(tagged);
    }

    merged.boxed()
}

/// Yield one round of chunks per iteration, one from each source in source
/// order, until any source is exhausted. No padding: the zipped stream is as
/// long as its shortest source. An error from any source is terminal.
pub fn zip(sources: Vec<ChunkStream>) -> ChunkBatchStream {
    stream::unfold((sources, false), |(mut sources, done)| async move {
        if done || sources.is_empty() {
            return None;
        }
        let mut round = Vec::with_capacity(sources.len());
        for source in sources.iter_mut() {
            match source.next().await {
                Some(Ok(chunk)) => round.push(chunk),
                Some(Err(err)) => return Some((Err(err), (sources, true))),
                None => return None,
            }
        }
        Some((Ok(round), (sources, false)))
    })
    .boxed()
}
