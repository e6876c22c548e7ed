//! The action contract consumed from the plugin system.
//!
//! An action is registered once, as either single-shot or streaming; the
//! executor branches on that discriminant, never on runtime type inspection.

use crate::core::cancel::CancellationToken;
use crate::core::errors::{ActionError, EngineError, Result};
use crate::core::progress::ProgressUpdate;
use crate::events::{EngineEvent, EventBus};
use crate::stream::ChunkStream;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// A single-result plugin operation.
#[async_trait]
pub trait SingleShotAction: Send + Sync + 'static {
    async fn execute(
        &self,
        params: Value,
        ctx: ActionCtx,
    ) -> std::result::Result<Value, ActionError>;
}

/// An incremental plugin operation producing a lazy chunk sequence.
///
/// The returned stream must poll `ctx.token` between chunks; the engine
/// never preempts it.
pub trait StreamingAction: Send + Sync + 'static {
    fn stream(&self, params: Value, ctx: ActionCtx) -> ChunkStream;
}

/// Closed discriminant over the two action shapes, fixed at registration.
#[derive(Clone)]
pub enum ActionKind {
    SingleShot(Arc<dyn SingleShotAction>),
    Streaming(Arc<dyn StreamingAction>),
}

/// Everything a running action attempt gets from the engine: its identity,
/// a cancellation token to poll, and a validated progress sink.
#[derive(Clone)]
pub struct ActionCtx {
    pub task_id: String,
    pub attempt: u32,
    pub token: CancellationToken,
    pub progress: ProgressSink,
}

impl ActionCtx {
    /// Convenience for cooperative loops: errors with `ActionError::Cancelled`
    /// once the token is set.
    pub fn check_cancelled(&self) -> std::result::Result<(), ActionError> {
        if self.token.is_cancelled() {
            Err(ActionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress forwarder that validates every update before it leaves the
/// engine. Malformed updates are dropped and logged, never emitted.
#[derive(Clone)]
pub struct ProgressSink {
    task_id: String,
    bus: EventBus,
}

impl ProgressSink {
    pub fn new(task_id: String, bus: EventBus) -> Self {
        Self { task_id, bus }
    }

    pub fn send(&self, update: ProgressUpdate) {
        if let Err(err) = update.validate() {
            warn!(
                task_id = %self.task_id,
                error = %err,
                "dropping malformed progress update"
            );
            return;
        }
        self.bus.emit(EngineEvent::Progress {
            task_id: self.task_id.clone(),
            update,
        });
    }
}

/// Registry of named actions, owned by the engine context.
#[derive(Default)]
pub struct ActionRegistry {
    actions: DashMap<String, ActionKind>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_single_shot<S: Into<String>>(
        &self,
        name: S,
        action: Arc<dyn SingleShotAction>,
    ) -> Result<()> {
        self.register(name.into(), ActionKind::SingleShot(action))
    }

    pub fn register_streaming<S: Into<String>>(
        &self,
        name: S,
        action: Arc<dyn StreamingAction>,
    ) -> Result<()> {
        self.register(name.into(), ActionKind::Streaming(action))
    }

    fn register(&self, name: String, kind: ActionKind) -> Result<()> {
        if self.actions.contains_key(&name) {
            return Err(EngineError::validation_field(
                format!("action '{name}' is already registered"),
                "action",
            ));
        }
        self.actions.insert(name, kind);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ActionKind> {
        self.actions.get(name).map(|kind| kind.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}
