//! The engine facade: one owned context wiring the registry, event bus,
//! metrics, checkpoint store, executor and scheduler together.

use crate::core::config::EngineConfig;
use crate::core::errors::Result;
use crate::events::{EventBus, EventEnvelope};
use crate::executor::executor::ActionExecutor;
use crate::executor::{ActionRegistry, SingleShotAction, StreamingAction};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::queue::scheduler::QueueStats;
use crate::queue::{PriorityTaskQueue, Task, TaskId, TaskSpec};
use crate::stream::persist::{CheckpointStore, StreamPersistence};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Plugin action execution engine.
///
/// Construct one per process, register actions, call [`start`](Engine::start)
/// once a runtime is available, then submit tasks. All outcomes flow through
/// the event stream returned by [`subscribe`](Engine::subscribe).
pub struct Engine {
    registry: Arc<ActionRegistry>,
    bus: EventBus,
    metrics: Arc<MetricsCollector>,
    persistence: Option<StreamPersistence>,
    queue: Arc<PriorityTaskQueue>,
    scheduler: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl Engine {
    /// Engine without stream checkpointing; streaming retries restart from
    /// position zero.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Engine with durable stream checkpoints; streaming retries resume
    /// after the last checkpointed position.
    pub fn with_checkpoints(config: EngineConfig, store: Arc<dyn CheckpointStore>) -> Result<Self> {
        let interval = config.checkpoint_interval;
        Self::build(config, Some(StreamPersistence::new(store, interval)))
    }

    fn build(config: EngineConfig, persistence: Option<StreamPersistence>) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ActionRegistry::new());
        let bus = EventBus::new(config.event_capacity);
        let metrics = Arc::new(MetricsCollector::new(config.retention_window));
        let executor = Arc::new(ActionExecutor::new(
            config.clone(),
            bus.clone(),
            metrics.clone(),
            persistence.clone(),
        ));
        let queue = Arc::new(PriorityTaskQueue::new(
            config,
            registry.clone(),
            executor,
            bus.clone(),
            metrics.clone(),
        ));
        Ok(Self {
            registry,
            bus,
            metrics,
            persistence,
            queue,
            scheduler: Mutex::new(None),
        })
    }

    pub fn register_single_shot<S: Into<String>>(
        &self,
        name: S,
        action: Arc<dyn SingleShotAction>,
    ) -> Result<()> {
        self.registry.register_single_shot(name, action)
    }

    pub fn register_streaming<S: Into<String>>(
        &self,
        name: S,
        action: Arc<dyn StreamingAction>,
    ) -> Result<()> {
        self.registry.register_streaming(name, action)
    }

    /// Spawn the scheduling loop onto the current runtime. Idempotent.
    pub fn start(&self) {
        let mut scheduler = self.scheduler.lock().expect("scheduler mutex poisoned");
        if scheduler.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(self.queue.clone().run_forever(shutdown_rx));
        *scheduler = Some((shutdown_tx, handle));
        info!("engine started");
    }

    /// Stop accepting dispatches and wait for the loop to exit. Attempts
    /// already in flight settle on their own. Idempotent.
    pub async fn shutdown(&self) {
        let stopped = self
            .scheduler
            .lock()
            .expect("scheduler mutex poisoned")
            .take();
        if let Some((shutdown_tx, handle)) = stopped {
            let _ = shutdown_tx.send(());
            let _ = handle.await;
            info!("engine stopped");
        }
    }

    pub fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        self.queue.submit(spec)
    }

    pub fn cancel(&self, task_id: &str) -> Result<()> {
        self.queue.cancel(task_id)
    }

    pub fn subscribe(&self) -> async_broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.queue.task(task_id)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn stream_persistence(&self) -> Option<&StreamPersistence> {
        self.persistence.as_ref()
    }
}
