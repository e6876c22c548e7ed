//! Event surface for the engine.
//!
//! Progress, stream chunks and terminal outcomes are values sent over a
//! broadcast channel that the external transport drains; the engine never
//! calls into a delivery mechanism directly.

use crate::core::progress::ProgressUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Structured events emitted to the external transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Progress {
        task_id: String,
        update: ProgressUpdate,
    },
    StreamChunk {
        stream_id: String,
        position: u64,
        payload: Value,
    },
    StreamComplete {
        stream_id: String,
        /// Total chunks delivered, including any replayed before resume skipping.
        chunks: u64,
    },
    TaskComplete {
        task_id: String,
        payload: Value,
    },
    TaskFailed {
        task_id: String,
        error: String,
        category: String,
        attempts: u32,
    },
    TaskCancelled {
        task_id: String,
        reason: Option<String>,
    },
}

/// Event envelope with global ordering metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub event: EngineEvent,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Broadcast bus the transport layer subscribes to.
///
/// Runs in overflow mode: a slow or absent subscriber drops its oldest
/// events rather than wedging the engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: async_broadcast::Sender<EventEnvelope>,
    // Kept open so emits succeed with zero subscribers.
    _keepalive: Arc<async_broadcast::InactiveReceiver<EventEnvelope>>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity);
        sender.set_overflow(true);
        Self {
            sender,
            _keepalive: Arc::new(receiver.deactivate()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand out a receiver for the transport to drain.
    pub fn subscribe(&self) -> async_broadcast::Receiver<EventEnvelope> {
        self.sender.new_receiver()
    }

    /// Stamp and emit an event. Emission is fire-and-forget; with overflow
    /// enabled the only failure mode is a closed channel, which is logged.
    pub fn emit(&self, event: EngineEvent) {
        let envelope = EventEnvelope {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp_ms: now_ms(),
            event,
        };
        if let Err(err) = self.sender.try_broadcast(envelope) {
            debug!(error = %err, "event bus emit failed");
        }
    }
}
