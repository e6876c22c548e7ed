//! Single-task execution: timeout racing, cooperative cancellation with a
//! bounded grace period, and retry with exponential backoff.

use crate::core::cancel::CancellationToken;
use crate::core::config::EngineConfig;
use crate::core::errors::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::executor::action::{ActionCtx, ActionKind, ProgressSink, SingleShotAction};
use crate::metrics::MetricsCollector;
use crate::stream::new_stream_id;
use crate::stream::persist::StreamPersistence;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// One scheduled action invocation, as handed over by the queue.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub task_id: String,
    pub params: Value,
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    /// Identity of the output stream for streaming actions; generated when
    /// absent. Ignored for single-shot actions.
    pub stream_id: Option<String>,
}

/// What one attempt chain produced: the terminal outcome and how many
/// executor invocations it took.
#[derive(Debug)]
pub struct ExecutionReport {
    pub attempts: u32,
    pub outcome: Result<Value>,
}

/// Runs one action invocation to its terminal outcome.
///
/// Owns the per-attempt [`CancellationToken`] lifecycle; the queue owns task
/// state, the executor owns everything between dispatch and terminal event.
pub struct ActionExecutor {
    config: EngineConfig,
    bus: EventBus,
    metrics: Arc<MetricsCollector>,
    persistence: Option<StreamPersistence>,
}

impl ActionExecutor {
    pub fn new(
        config: EngineConfig,
        bus: EventBus,
        metrics: Arc<MetricsCollector>,
        persistence: Option<StreamPersistence>,
    ) -> Self {
        Self {
            config,
            bus,
            metrics,
            persistence,
        }
    }

    /// Run the invocation through its retry budget and emit exactly one
    /// terminal event for the whole attempt chain.
    pub async fn run(
        &self,
        invocation: Invocation,
        kind: ActionKind,
        cancel: CancellationToken,
    ) -> ExecutionReport {
        // Stream identity is fixed for the whole attempt chain; a retry must
        // checkpoint and resume under the same id.
        let mut invocation = invocation;
        if invocation.stream_id.is_none() && matches!(kind, ActionKind::Streaming(_)) {
            invocation.stream_id = Some(new_stream_id());
        }

        let task_id = invocation.task_id.clone();
        let attempt_timeout = invocation.timeout.or(self.config.default_timeout);
        let mut attempts = 0u32;

        let outcome = loop {
            if cancel.is_cancelled() {
                break Err(EngineError::cancelled(&task_id));
            }
            attempts += 1;

            let started = Instant::now();
            let result = self
                .run_attempt(&invocation, &kind, attempt_timeout, &cancel, attempts)
                .await;
            let elapsed = started.elapsed();
            self.metrics.record_attempt(elapsed);
            self.metrics
                .record(&task_id, "attempt_duration_ms", elapsed.as_millis() as f64);

            match result {
                Ok(value) => break Ok(value),
                Err(err) => {
                    let retryable = err.is_retryable()
                        || (matches!(err, EngineError::Timeout { .. })
                            && self.config.retry_on_timeout);
                    if !retryable || attempts >= invocation.max_attempts {
                        break Err(err);
                    }
                    let delay = self.backoff_delay(attempts);
                    info!(
                        task_id = %task_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel.cancelled() => break Err(EngineError::cancelled(&task_id)),
                    }
                }
            }
        };

        self.emit_terminal(&task_id, &outcome, attempts);
        ExecutionReport { attempts, outcome }
    }

    async fn run_attempt(
        &self,
        invocation: &Invocation,
        kind: &ActionKind,
        attempt_timeout: Option<Duration>,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<Value> {
        let token = CancellationToken::new();
        let ctx = ActionCtx {
            task_id: invocation.task_id.clone(),
            attempt,
            token: token.clone(),
            progress: ProgressSink::new(invocation.task_id.clone(), self.bus.clone()),
        };

        match kind {
            ActionKind::SingleShot(action) => {
                self.single_shot_attempt(invocation, action.clone(), ctx, attempt_timeout, cancel)
                    .await
            }
            ActionKind::Streaming(action) => {
                let stream_id = invocation
                    .stream_id
                    .clone()
                    .unwrap_or_else(new_stream_id);
                let source = match &self.persistence {
                    Some(persistence) => {
                        let action = action.clone();
                        let params = invocation.params.clone();
                        let factory_ctx = ctx.clone();
                        persistence
                            .resume(&stream_id, move || {
                                action.stream(params, factory_ctx)
                            })
                            .await?
                    }
                    None => action.stream(invocation.params.clone(), ctx),
                };
                self.drain_stream(invocation, source, stream_id, token, attempt_timeout, cancel)
                    .await
            }
        }
    }

    async fn single_shot_attempt(
        &self,
        invocation: &Invocation,
        action: Arc<dyn SingleShotAction>,
        ctx: ActionCtx,
        attempt_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let task_id = invocation.task_id.clone();
        let token = ctx.token.clone();
        let params = invocation.params.clone();

        let mut handle = tokio::spawn(async move { action.execute(params, ctx).await });

        let timer = async {
            match attempt_timeout {
                Some(bound) => sleep(bound).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timer);

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.into_engine_error(&task_id)),
                Err(join_err) => Err(EngineError::Permanent {
                    message: format!("action aborted: {join_err}"),
                    source: None,
                }),
            },
            _ = cancel.cancelled() => {
                token.cancel();
                // Give the action its grace period; the result is discarded
                // either way once cancellation was requested.
                let _ = timeout(self.config.grace_period, &mut handle).await;
                Err(EngineError::cancelled(&task_id))
            }
            _ = &mut timer => {
                token.cancel();
                if timeout(self.config.grace_period, &mut handle).await.is_err() {
                    // Non-compliant action: detach it and move on. It keeps
                    // running until it finishes on its own; its result is
                    // discarded. Documented resource leak risk.
                    warn!(
                        task_id = %task_id,
                        "action ignored cancellation past grace period, detaching"
                    );
                }
                let bound = attempt_timeout.unwrap_or_default();
                Err(EngineError::timeout(&task_id, bound.as_millis() as u64))
            }
        }
    }

    async fn drain_stream(
        &self,
        invocation: &Invocation,
        mut source: crate::stream::ChunkStream,
        stream_id: String,
        token: CancellationToken,
        attempt_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let task_id = &invocation.task_id;
        let mut chunks = 0u64;

        let timer = async {
            match attempt_timeout {
                Some(bound) => sleep(bound).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    token.cancel();
                    // The stream is dropped with this future; nothing orphans.
                    return Err(EngineError::cancelled(task_id));
                }
                _ = &mut timer => {
                    token.cancel();
                    let bound = attempt_timeout.unwrap_or_default();
                    return Err(EngineError::timeout(task_id, bound.as_millis() as u64));
                }
                item = source.next() => match item {
                    Some(Ok(chunk)) => {
                        chunks += 1;
                        self.bus.emit(EngineEvent::StreamChunk {
                            stream_id: stream_id.clone(),
                            position: chunk.position,
                            payload: chunk.data,
                        });
                        self.metrics.record(&stream_id, "chunks", chunks as f64);
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        self.bus.emit(EngineEvent::StreamComplete {
                            stream_id: stream_id.clone(),
                            chunks,
                        });
                        // A completed stream will never resume; its checkpoint
                        // is dead weight in the store.
                        if let Some(persistence) = &self.persistence {
                            if let Err(err) = persistence.delete(&stream_id).await {
                                warn!(
                                    stream_id = %stream_id,
                                    error = %err,
                                    "failed to drop checkpoint for completed stream"
                                );
                            }
                        }
                        debug!(task_id = %task_id, stream_id = %stream_id, chunks, "stream complete");
                        return Ok(json!({ "stream_id": stream_id, "chunks": chunks }));
                    }
                }
            }
        }
    }

    fn emit_terminal(&self, task_id: &str, outcome: &Result<Value>, attempts: u32) {
        match outcome {
            Ok(value) => {
                self.metrics.tasks_completed.fetch_add(1, Ordering::Relaxed);
                self.bus.emit(EngineEvent::TaskComplete {
                    task_id: task_id.to_string(),
                    payload: value.clone(),
                });
            }
            Err(EngineError::Cancelled { reason, .. }) => {
                self.metrics.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
                self.bus.emit(EngineEvent::TaskCancelled {
                    task_id: task_id.to_string(),
                    reason: reason.clone(),
                });
            }
            Err(err) => {
                self.metrics.tasks_failed.fetch_add(1, Ordering::Relaxed);
                self.bus.emit(EngineEvent::TaskFailed {
                    task_id: task_id.to_string(),
                    error: err.to_string(),
                    category: err.category().to_string(),
                    attempts,
                });
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exponential = self
            .config
            .retry_base_delay
            .saturating_mul(factor)
            .min(self.config.max_backoff);
        // Half-jitter keeps retries spread without collapsing the floor.
        exponential.mul_f64(0.5 + fastrand::f64() / 2.0)
    }
}
