//! Streaming tests across module boundaries: operators composed over real
//! sources, engine-driven streams, and checkpoints that survive an engine
//! restart.

use actionflow::stream::compose::{merge, zip};
use actionflow::stream::persist::{SledStore, StreamPersistence};
use actionflow::stream::transform::{batch, filter, map};
use actionflow::stream::{from_values, ChunkStream, StreamChunk};
use actionflow::{
    ActionCtx, Engine, EngineConfig, EngineError, EngineEvent, StreamingAction, TaskSpec,
    TaskState,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct Counter;

impl StreamingAction for Counter {
    fn stream(&self, params: Value, _ctx: ActionCtx) -> ChunkStream {
        let up_to = params["up_to"].as_u64().unwrap_or(0);
        from_values((0..up_to).map(|i| json!(i)).collect())
    }
}

/// Yields five chunks and then dies, leaving a partial stream behind.
struct Interrupted;

impl StreamingAction for Interrupted {
    fn stream(&self, _params: Value, _ctx: ActionCtx) -> ChunkStream {
        futures::stream::iter(
            (0..5)
                .map(|i| Ok(StreamChunk::new(i, json!(i))))
                .chain(std::iter::once(Err(EngineError::permanent(
                    "source went away",
                ))))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }
}

fn engine_config() -> EngineConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    EngineConfig::builder()
        .max_concurrent(2)
        .queue_poll_interval(Duration::from_millis(2))
        .checkpoint_interval(4)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_operator_pipeline_over_merged_sources() {
    // Two sources merged, doubled, odd values filtered out, batched in pairs.
    let sources = vec![
        from_values((0..4).map(|i| json!(i)).collect()),
        from_values((10..14).map(|i| json!(i)).collect()),
    ];
    let merged = merge(sources, 8)
        .map(|r| r.map(|tagged| tagged.chunk))
        .boxed();
    let doubled = map(merged, |v| Ok(json!(v.as_u64().unwrap() * 2)));
    let kept = filter(doubled, |v| Ok(v.as_u64().unwrap() % 4 == 0));
    let batches: Vec<_> = batch(kept, 2)
        .map(|r| r.unwrap())
        .collect::<Vec<_>>()
        .await;

    let values: Vec<u64> = batches
        .iter()
        .flatten()
        .map(|chunk| chunk.data.as_u64().unwrap())
        .collect();
    // Doubling 0..4 and 10..14 keeps the multiples of four: 0,4 and 20,24.
    let mut sorted = values.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 4, 20, 24]);
    assert!(batches.iter().all(|b| b.len() <= 2));
}

#[tokio::test]
async fn test_zip_ends_at_shortest_source() {
    let sources = vec![
        from_values((0..5).map(|i| json!(i)).collect()),
        from_values((0..5).map(|i| json!(i * 10)).collect()),
        from_values((0..3).map(|i| json!(i * 100)).collect()),
    ];
    let rounds: Vec<_> = zip(sources)
        .map(|r| r.unwrap())
        .collect::<Vec<_>>()
        .await;

    assert_eq!(rounds.len(), 3);
    for (i, round) in rounds.iter().enumerate() {
        let values: Vec<u64> = round.iter().map(|c| c.data.as_u64().unwrap()).collect();
        let i = i as u64;
        assert_eq!(values, vec![i, i * 10, i * 100]);
    }
}

#[tokio::test]
async fn test_engine_stream_emits_ordered_chunks() {
    let engine = Engine::new(engine_config()).unwrap();
    engine.register_streaming("count", Arc::new(Counter)).unwrap();
    let mut rx = engine.subscribe();
    engine.start();

    let id = engine
        .submit(TaskSpec::new("count", json!({"up_to": 6})).with_stream_id("s-ordered"))
        .unwrap();

    let mut positions = Vec::new();
    let mut total = None;
    timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await.unwrap().event {
                EngineEvent::StreamChunk { stream_id, position, .. } => {
                    assert_eq!(stream_id, "s-ordered");
                    positions.push(position);
                }
                EngineEvent::StreamComplete { chunks, .. } => {
                    total = Some(chunks);
                }
                EngineEvent::TaskComplete { task_id, payload } => {
                    assert_eq!(task_id, id);
                    assert_eq!(payload["stream_id"], "s-ordered");
                    break;
                }
                EngineEvent::TaskFailed { error, .. } => panic!("stream failed: {error}"),
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(total, Some(6));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_checkpoints_survive_engine_restart() {
    let dir = tempfile::tempdir().unwrap();

    // First engine: one stream dies partway through (checkpoint interval 4,
    // so position 3 is durable), one runs to completion.
    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let engine = Engine::with_checkpoints(engine_config(), store).unwrap();
        engine
            .register_streaming("interrupted", Arc::new(Interrupted))
            .unwrap();
        engine.register_streaming("count", Arc::new(Counter)).unwrap();
        engine.start();

        let partial = engine
            .submit(
                TaskSpec::new("interrupted", json!({}))
                    .with_stream_id("s-durable")
                    .with_max_attempts(1),
            )
            .unwrap();
        let complete = engine
            .submit(TaskSpec::new("count", json!({"up_to": 10})).with_stream_id("s-complete"))
            .unwrap();
        timeout(Duration::from_secs(3), async {
            loop {
                let partial_done = engine.task(&partial).map(|t| t.state)
                    == Some(TaskState::Failed);
                let complete_done = engine.task(&complete).map(|t| t.state)
                    == Some(TaskState::Completed);
                if partial_done && complete_done {
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        engine.shutdown().await;
    }

    // Second process over the same store: the interrupted stream's checkpoint
    // survived and resume picks up after it; the completed stream left
    // nothing behind.
    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let persistence = StreamPersistence::new(store, 4);
    let cp = persistence
        .last_checkpoint("s-durable")
        .await
        .unwrap()
        .expect("checkpoint should survive restart");
    assert_eq!(cp.position, 3);
    assert!(persistence
        .last_checkpoint("s-complete")
        .await
        .unwrap()
        .is_none());

    let resumed = persistence
        .resume("s-durable", || {
            from_values((0..10).map(|i| json!(i)).collect())
        })
        .await
        .unwrap();
    let positions: Vec<_> = resumed
        .map(|r| r.unwrap().position)
        .collect::<Vec<_>>()
        .await;
    assert_eq!(positions, vec![4, 5, 6, 7, 8, 9]);
}
