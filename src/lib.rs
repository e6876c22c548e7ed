// Core infrastructure modules
pub mod core {
    pub mod cancel;
    pub mod config;
    pub mod errors;
    pub mod progress;
}

pub mod engine; // Owned context tying the pieces together
pub mod events; // Broadcast event stream
pub mod executor; // Action contract and per-task execution
pub mod metrics; // Rolling-window metrics
pub mod queue; // Prioritized, dependency-aware scheduling
pub mod stream; // Chunk streams: transform, compose, persist

// Re-exports for convenience
pub use core::cancel::CancellationToken;
pub use core::config::EngineConfig;
pub use core::errors::{ActionError, EngineError, Result};
pub use core::progress::{ProgressStatus, ProgressUpdate};
pub use engine::Engine;
pub use events::{EngineEvent, EventBus, EventEnvelope};
pub use executor::{ActionCtx, ActionRegistry, SingleShotAction, StreamingAction};
pub use queue::{Task, TaskId, TaskPriority, TaskSpec, TaskState};
pub use stream::{ChunkStream, StreamChunk};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    struct Greeter;

    #[async_trait]
    impl SingleShotAction for Greeter {
        async fn execute(
            &self,
            params: Value,
            ctx: ActionCtx,
        ) -> std::result::Result<Value, ActionError> {
            ctx.progress.send(ProgressUpdate::running(50.0, "greeting"));
            let name = params["name"].as_str().unwrap_or("world");
            Ok(json!({ "greeting": format!("hello, {name}") }))
        }
    }

    struct Counter;

    impl StreamingAction for Counter {
        fn stream(&self, params: Value, _ctx: ActionCtx) -> ChunkStream {
            let up_to = params["up_to"].as_u64().unwrap_or(0);
            stream::from_values((0..up_to).map(|i| json!(i)).collect())
        }
    }

    #[tokio::test]
    async fn test_engine_end_to_end() {
        let config = EngineConfig::builder()
            .max_concurrent(2)
            .queue_poll_interval(Duration::from_millis(2))
            .build()
            .unwrap();
        let engine = Engine::new(config).unwrap();
        engine
            .register_single_shot("greet", Arc::new(Greeter))
            .unwrap();
        engine
            .register_streaming("count", Arc::new(Counter))
            .unwrap();
        let mut rx = engine.subscribe();
        engine.start();

        let greet_id = engine
            .submit(TaskSpec::new("greet", json!({"name": "ada"})))
            .unwrap();
        let count_id = engine
            .submit(
                TaskSpec::new("count", json!({"up_to": 3}))
                    .with_dependencies([greet_id.clone()]),
            )
            .unwrap();

        let mut progress = 0;
        let mut chunks = 0;
        let mut completed = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while completed.len() < 2 {
            let envelope = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("engine stalled")
                .unwrap();
            match envelope.event {
                EngineEvent::Progress { .. } => progress += 1,
                EngineEvent::StreamChunk { .. } => chunks += 1,
                EngineEvent::TaskComplete { task_id, .. } => completed.push(task_id),
                EngineEvent::TaskFailed { error, .. } => panic!("task failed: {error}"),
                _ => {}
            }
        }

        // The dependency gates the stream behind the greeting.
        assert_eq!(completed, vec![greet_id, count_id]);
        assert!(progress >= 1);
        assert_eq!(chunks, 3);

        engine.shutdown().await;
    }
}
