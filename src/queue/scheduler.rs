//! The priority scheduling loop.
//!
//! Three strict-priority FIFO tiers feed a semaphore-bounded dispatch loop.
//! The queue exclusively owns task state transitions; the executor owns
//! everything between dispatch and the terminal event.

use crate::core::cancel::CancellationToken;
use crate::core::config::EngineConfig;
use crate::core::errors::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::executor::executor::{ActionExecutor, ExecutionReport, Invocation};
use crate::executor::ActionRegistry;
use crate::metrics::MetricsCollector;
use crate::queue::task::{Task, TaskId, TaskSpec, TaskState};
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Dependency-aware priority queue dispatching to the [`ActionExecutor`].
pub struct PriorityTaskQueue {
    config: EngineConfig,
    registry: Arc<ActionRegistry>,
    executor: Arc<ActionExecutor>,
    bus: EventBus,
    metrics: Arc<MetricsCollector>,

    /// Task state table. One critical section per mutation; no writers
    /// outside this module.
    tasks: DashMap<TaskId, Task>,
    /// One FIFO per priority tier. Entries are lazily invalidated: a task
    /// cancelled while queued is skipped at pop time.
    tiers: [Mutex<VecDeque<TaskId>>; 3],
    /// dep id -> tasks waiting on it.
    dependents: DashMap<TaskId, DashSet<TaskId>>,
    /// Per-task cancellation flag, shared with the running attempt chain.
    cancel_flags: DashMap<TaskId, CancellationToken>,

    work: Notify,
    semaphore: Arc<Semaphore>,
}

/// Point-in-time queue depths, mostly for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: [usize; 3],
    pub tracked_tasks: usize,
    pub available_slots: usize,
}

impl PriorityTaskQueue {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ActionRegistry>,
        executor: Arc<ActionExecutor>,
        bus: EventBus,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            registry,
            executor,
            bus,
            metrics,
            tasks: DashMap::new(),
            tiers: [
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
            ],
            dependents: DashMap::new(),
            cancel_flags: DashMap::new(),
            work: Notify::new(),
            semaphore,
        }
    }

    /// Validate and admit a task. Validation failures surface synchronously;
    /// everything after admission is reported through events.
    pub fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        if !self.registry.contains(&spec.action) {
            return Err(EngineError::validation_field(
                format!("action '{}' is not registered", spec.action),
                "action",
            ));
        }

        let task = Task::from_spec(spec, self.config.max_attempts);
        let task_id = task.id.clone();

        if task.dependencies.iter().any(|dep| *dep == task_id) {
            return Err(EngineError::validation_field(
                format!("task '{task_id}' depends on itself"),
                "dependencies",
            ));
        }
        for dep in &task.dependencies {
            if !self.tasks.contains_key(dep) {
                return Err(EngineError::validation_field(
                    format!("unknown dependency '{dep}'"),
                    "dependencies",
                ));
            }
        }

        let dep_states: Vec<(TaskId, TaskState)> = task
            .dependencies
            .iter()
            .filter_map(|dep| self.tasks.get(dep).map(|t| (dep.clone(), t.state)))
            .collect();
        let failed_dep = dep_states
            .iter()
            .find(|(_, state)| matches!(state, TaskState::Failed | TaskState::Cancelled));
        let unresolved: Vec<TaskId> = dep_states
            .iter()
            .filter(|(_, state)| *state != TaskState::Completed)
            .map(|(dep, _)| dep.clone())
            .collect();

        let mut task = task;

        if let Some((dep, _)) = failed_dep {
            // Dependency already ended badly; never run with missing inputs.
            task.state = TaskState::Cancelled;
            task.finished_at = Some(Utc::now());
            let reason = format!("dependency '{dep}' did not complete");
            self.insert_new(task)?;
            self.metrics.tasks_submitted.fetch_add(1, Ordering::Relaxed);
            self.metrics.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
            self.bus.emit(EngineEvent::TaskCancelled {
                task_id: task_id.clone(),
                reason: Some(reason),
            });
            return Ok(task_id);
        }

        if unresolved.is_empty() {
            task.state = TaskState::Queued;
            let tier = task.priority.tier_index();
            self.insert_new(task)?;
            self.cancel_flags
                .insert(task_id.clone(), CancellationToken::new());
            self.push_tier(tier, task_id.clone());
            debug!(task_id = %task_id, "task queued");
        } else {
            task.state = TaskState::Waiting;
            self.insert_new(task)?;
            self.cancel_flags
                .insert(task_id.clone(), CancellationToken::new());
            for dep in &unresolved {
                self.dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(task_id.clone());
            }
            // A dependency may have reached a terminal state between the
            // snapshot and the index insert, in which case its cascade has
            // already consumed the index entry; re-check so the task cannot
            // strand in Waiting.
            self.recheck_waiting(&task_id);
            debug!(task_id = %task_id, deps = unresolved.len(), "task waiting on dependencies");
        }
        self.metrics.tasks_submitted.fetch_add(1, Ordering::Relaxed);

        Ok(task_id)
    }

    fn insert_new(&self, task: Task) -> Result<()> {
        match self.tasks.entry(task.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::validation_field(
                    format!("task id '{}' already exists", task.id),
                    "id",
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(task);
                Ok(())
            }
        }
    }

    fn push_tier(&self, tier: usize, task_id: TaskId) {
        self.tiers[tier]
            .lock()
            .expect("tier mutex poisoned")
            .push_back(task_id);
        self.work.notify_one();
    }

    /// Cancel a task. Idempotent; cancelling a terminal task is a no-op.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        let Some(mut task) = self.tasks.get_mut(task_id) else {
            return Err(EngineError::validation_field(
                format!("unknown task '{task_id}'"),
                "task_id",
            ));
        };

        match task.state {
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled => Ok(()),
            TaskState::Queued | TaskState::Waiting => {
                task.state = TaskState::Cancelled;
                task.updated_at = Utc::now();
                task.finished_at = Some(Utc::now());
                drop(task);
                self.cancel_flags.remove(task_id);
                self.metrics.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
                self.bus.emit(EngineEvent::TaskCancelled {
                    task_id: task_id.to_string(),
                    reason: None,
                });
                info!(task_id, "task cancelled before dispatch");
                self.cascade_cancel(task_id);
                Ok(())
            }
            TaskState::Running | TaskState::Cancelling => {
                task.state = TaskState::Cancelling;
                task.updated_at = Utc::now();
                drop(task);
                if let Some(flag) = self.cancel_flags.get(task_id) {
                    flag.cancel();
                }
                info!(task_id, "cancellation requested for running task");
                Ok(())
            }
        }
    }

    /// The scheduling loop. Dispatches eligible work while capacity allows;
    /// exits when the shutdown signal fires, after which in-flight attempts
    /// settle on their own.
    pub async fn run_forever(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        info!(
            max_concurrent = self.config.max_concurrent,
            "scheduler loop started"
        );
        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.expect("scheduler semaphore closed")
                }
            };

            match self.pop_eligible() {
                Some(task_id) => {
                    self.clone().dispatch(task_id, permit);
                }
                None => {
                    drop(permit);
                    self.evict_expired();
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.work.notified() => {}
                        _ = sleep(self.config.queue_poll_interval) => {}
                    }
                }
            }
        }
        info!("scheduler loop stopped");
    }

    /// Pop the next dispatchable task, strictly preferring higher tiers and
    /// FIFO within a tier. Transitions it `Queued -> Running` before
    /// returning, so a task is handed to the executor exactly once.
    fn pop_eligible(&self) -> Option<TaskId> {
        for tier in &self.tiers {
            let mut queue = tier.lock().expect("tier mutex poisoned");
            while let Some(task_id) = queue.pop_front() {
                if let Some(mut task) = self.tasks.get_mut(&task_id) {
                    if task.state == TaskState::Queued {
                        task.state = TaskState::Running;
                        task.updated_at = Utc::now();
                        return Some(task_id);
                    }
                    // Cancelled while queued; skip the stale entry.
                }
            }
        }
        None
    }

    fn dispatch(self: Arc<Self>, task_id: TaskId, permit: tokio::sync::OwnedSemaphorePermit) {
        let Some(task) = self.tasks.get(&task_id).map(|t| t.clone()) else {
            warn!(task_id = %task_id, "dispatched task vanished from table");
            return;
        };
        let Some(kind) = self.registry.get(&task.action) else {
            drop(permit);
            self.fail_unrunnable(&task_id, "action disappeared from registry");
            return;
        };
        let cancel = self
            .cancel_flags
            .get(&task_id)
            .map(|flag| flag.clone())
            .unwrap_or_default();

        let invocation = Invocation {
            task_id: task_id.clone(),
            params: task.params,
            timeout: task.timeout,
            max_attempts: task.max_attempts,
            stream_id: task.stream_id,
        };

        tokio::spawn(async move {
            debug!(task_id = %task_id, action = %task.action, "dispatching task");
            let report = self.executor.run(invocation, kind, cancel).await;
            self.finish(&task_id, report);
            drop(permit);
            self.work.notify_one();
        });
    }

    fn fail_unrunnable(&self, task_id: &str, message: &str) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.state = TaskState::Failed;
            task.error = Some(message.to_string());
            task.updated_at = Utc::now();
            task.finished_at = Some(Utc::now());
        }
        self.cancel_flags.remove(task_id);
        self.metrics.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.bus.emit(EngineEvent::TaskFailed {
            task_id: task_id.to_string(),
            error: message.to_string(),
            category: "permanent".to_string(),
            attempts: 0,
        });
        self.cascade_cancel(task_id);
    }

    /// Record the executor's terminal outcome and wake or cancel dependents.
    /// Terminal events for dispatched tasks were already emitted by the
    /// executor; this only mutates queue-owned state.
    fn finish(&self, task_id: &str, report: ExecutionReport) {
        let now = Utc::now();
        let completed = {
            let Some(mut task) = self.tasks.get_mut(task_id) else {
                warn!(task_id, "finished task vanished from table");
                return;
            };
            task.attempts = report.attempts;
            task.updated_at = now;
            task.finished_at = Some(now);
            match &report.outcome {
                Ok(_) => {
                    task.state = TaskState::Completed;
                    true
                }
                Err(EngineError::Cancelled { .. }) => {
                    task.state = TaskState::Cancelled;
                    false
                }
                Err(err) => {
                    task.state = TaskState::Failed;
                    task.error = Some(err.to_string());
                    false
                }
            }
        };
        self.cancel_flags.remove(task_id);
        self.metrics
            .record(task_id, "attempts", report.attempts as f64);

        if completed {
            self.resolve_dependents(task_id);
        } else {
            self.cascade_cancel(task_id);
        }
    }

    /// A dependency completed: re-check every task waiting on it.
    fn resolve_dependents(&self, dep_id: &str) {
        if let Some((_, waiters)) = self.dependents.remove(dep_id) {
            for waiter in waiters {
                self.promote_if_ready(&waiter);
            }
        }
    }

    /// Re-examine a Waiting task against the current state of its
    /// dependencies: a terminal-bad dependency cancels it, a fully completed
    /// set queues it, anything else leaves it waiting for the next signal.
    fn recheck_waiting(&self, task_id: &str) {
        let bad_dep = {
            let Some(task) = self.tasks.get(task_id) else {
                return;
            };
            if task.state != TaskState::Waiting {
                return;
            }
            task.dependencies
                .iter()
                .find(|dep| {
                    self.tasks.get(dep.as_str()).is_some_and(|d| {
                        matches!(d.state, TaskState::Failed | TaskState::Cancelled)
                    })
                })
                .cloned()
        };
        match bad_dep {
            Some(dep) => self.cancel_waiting(task_id, &dep),
            None => self.promote_if_ready(task_id),
        }
    }

    fn cancel_waiting(&self, task_id: &str, dep_id: &str) {
        let cancelled = {
            let Some(mut task) = self.tasks.get_mut(task_id) else {
                return;
            };
            if task.state != TaskState::Waiting {
                false
            } else {
                task.state = TaskState::Cancelled;
                task.updated_at = Utc::now();
                task.finished_at = Some(Utc::now());
                true
            }
        };
        if cancelled {
            self.cancel_flags.remove(task_id);
            self.metrics.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
            self.bus.emit(EngineEvent::TaskCancelled {
                task_id: task_id.to_string(),
                reason: Some(format!("dependency '{dep_id}' did not complete")),
            });
            info!(task_id, dependency = %dep_id, "task cancelled by upstream outcome");
            self.cascade_cancel(task_id);
        }
    }

    fn promote_if_ready(&self, task_id: &str) {
        // Read dependency states before taking the task's own lock; terminal
        // states never revert, so the snapshot stays valid.
        let deps_ready = {
            let Some(task) = self.tasks.get(task_id) else {
                return;
            };
            if task.state != TaskState::Waiting {
                return;
            }
            task.dependencies.iter().all(|dep| {
                self.tasks
                    .get(dep)
                    .is_some_and(|d| d.state == TaskState::Completed)
            })
        };
        if !deps_ready {
            return;
        }

        let tier = {
            let Some(mut task) = self.tasks.get_mut(task_id) else {
                return;
            };
            if task.state != TaskState::Waiting {
                return;
            }
            task.state = TaskState::Queued;
            task.updated_at = Utc::now();
            task.priority.tier_index()
        };
        debug!(task_id, "dependencies resolved, task queued");
        self.push_tier(tier, task_id.to_string());
    }

    /// Propagate a failed or cancelled dependency downstream: every task
    /// transitively waiting on it is Cancelled, distinct from Failed, so
    /// callers can tell "never ran" from "errored".
    fn cascade_cancel(&self, root_id: &str) {
        let mut pending = vec![root_id.to_string()];
        while let Some(dep_id) = pending.pop() {
            let Some((_, waiters)) = self.dependents.remove(&dep_id) else {
                continue;
            };
            for waiter in waiters {
                let cancelled = {
                    let Some(mut task) = self.tasks.get_mut(&waiter) else {
                        continue;
                    };
                    if task.state.is_terminal() || task.state == TaskState::Running {
                        false
                    } else {
                        task.state = TaskState::Cancelled;
                        task.updated_at = Utc::now();
                        task.finished_at = Some(Utc::now());
                        true
                    }
                };
                if cancelled {
                    self.cancel_flags.remove(&waiter);
                    self.metrics.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
                    self.bus.emit(EngineEvent::TaskCancelled {
                        task_id: waiter.clone(),
                        reason: Some(format!("dependency '{dep_id}' did not complete")),
                    });
                    info!(task_id = %waiter, dependency = %dep_id, "task cancelled by upstream outcome");
                    pending.push(waiter);
                }
            }
        }
    }

    /// Evict terminal tasks past the retention window, and their metrics.
    fn evict_expired(&self) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention_window)
                .unwrap_or_else(|_| chrono::Duration::try_hours(1).unwrap());
        let expired: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|entry| {
                entry.state.is_terminal()
                    && entry.finished_at.is_some_and(|at| at < cutoff)
            })
            .map(|entry| entry.id.clone())
            .collect();
        for task_id in expired {
            self.tasks.remove(&task_id);
            self.dependents.remove(&task_id);
            self.metrics.evict(&task_id);
            debug!(task_id = %task_id, "evicted expired task record");
        }
    }

    /// Snapshot of a tracked task, if it has not been evicted.
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: [
                self.tiers[0].lock().expect("tier mutex poisoned").len(),
                self.tiers[1].lock().expect("tier mutex poisoned").len(),
                self.tiers[2].lock().expect("tier mutex poisoned").len(),
            ],
            tracked_tasks: self.tasks.len(),
            available_slots: self.semaphore.available_permits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ActionError;
    use crate::executor::action::{ActionCtx, SingleShotAction};
    use crate::queue::task::TaskPriority;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl SingleShotAction for Echo {
        async fn execute(
            &self,
            params: Value,
            _ctx: ActionCtx,
        ) -> std::result::Result<Value, ActionError> {
            Ok(params)
        }
    }

    fn harness(max_concurrent: usize) -> Arc<PriorityTaskQueue> {
        let config = EngineConfig::builder()
            .max_concurrent(max_concurrent)
            .queue_poll_interval(Duration::from_millis(2))
            .build()
            .unwrap();
        let registry = Arc::new(ActionRegistry::new());
        registry.register_single_shot("echo", Arc::new(Echo)).unwrap();
        let bus = EventBus::new(256);
        let metrics = Arc::new(MetricsCollector::new(Duration::from_secs(3600)));
        let executor = Arc::new(ActionExecutor::new(
            config.clone(),
            bus.clone(),
            metrics.clone(),
            None,
        ));
        Arc::new(PriorityTaskQueue::new(
            config, registry, executor, bus, metrics,
        ))
    }

    #[test]
    fn test_submit_rejects_unknown_action() {
        let queue = harness(1);
        let err = queue
            .submit(TaskSpec::new("missing", json!({})))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_submit_rejects_unknown_dependency() {
        let queue = harness(1);
        let err = queue
            .submit(TaskSpec::new("echo", json!({})).with_dependencies(["ghost"]))
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_submit_rejects_duplicate_id() {
        let queue = harness(1);
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("dup"))
            .unwrap();
        assert!(queue
            .submit(TaskSpec::new("echo", json!({})).with_id("dup"))
            .is_err());
    }

    #[test]
    fn test_submit_rejects_self_dependency() {
        let queue = harness(1);
        let err = queue
            .submit(
                TaskSpec::new("echo", json!({}))
                    .with_id("loop")
                    .with_dependencies(["loop"]),
            )
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_dependent_task_waits() {
        let queue = harness(1);
        let a = queue
            .submit(TaskSpec::new("echo", json!({})).with_id("a"))
            .unwrap();
        let b = queue
            .submit(TaskSpec::new("echo", json!({})).with_dependencies([a]))
            .unwrap();
        assert_eq!(queue.task(&b).unwrap().state, TaskState::Waiting);
        assert_eq!(queue.task("a").unwrap().state, TaskState::Queued);
    }

    #[test]
    fn test_pop_prefers_high_tier_fifo_within_tier() {
        let queue = harness(1);
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("low").with_priority(TaskPriority::Low))
            .unwrap();
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("n1"))
            .unwrap();
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("n2"))
            .unwrap();
        queue
            .submit(
                TaskSpec::new("echo", json!({}))
                    .with_id("high")
                    .with_priority(TaskPriority::High),
            )
            .unwrap();

        assert_eq!(queue.pop_eligible().as_deref(), Some("high"));
        assert_eq!(queue.pop_eligible().as_deref(), Some("n1"));
        assert_eq!(queue.pop_eligible().as_deref(), Some("n2"));
        assert_eq!(queue.pop_eligible().as_deref(), Some("low"));
        assert_eq!(queue.pop_eligible(), None);
    }

    #[test]
    fn test_cancel_queued_task_skipped_at_pop() {
        let queue = harness(1);
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("t"))
            .unwrap();
        queue.cancel("t").unwrap();
        assert_eq!(queue.task("t").unwrap().state, TaskState::Cancelled);
        assert_eq!(queue.pop_eligible(), None);
        // Idempotent on terminal state.
        queue.cancel("t").unwrap();
    }

    #[test]
    fn test_submit_against_failed_dependency_is_cancelled() {
        let queue = harness(1);
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("dep"))
            .unwrap();
        queue.cancel("dep").unwrap();

        let id = queue
            .submit(TaskSpec::new("echo", json!({})).with_dependencies(["dep"]))
            .unwrap();
        assert_eq!(queue.task(&id).unwrap().state, TaskState::Cancelled);
    }

    #[test]
    fn test_waiting_task_not_stranded_by_dependency_failing_mid_submit() {
        let queue = harness(1);
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("d"))
            .unwrap();
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("w").with_dependencies(["d"]))
            .unwrap();
        assert_eq!(queue.task("w").unwrap().state, TaskState::Waiting);

        // Dependency turned terminal after the submit-time snapshot and its
        // cascade already consumed the index entry for it.
        queue.dependents.remove("d");
        queue.tasks.get_mut("d").unwrap().state = TaskState::Failed;

        queue.recheck_waiting("w");
        assert_eq!(queue.task("w").unwrap().state, TaskState::Cancelled);
    }

    #[test]
    fn test_cascade_cancel_runs_transitively() {
        let queue = harness(1);
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("a"))
            .unwrap();
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("b").with_dependencies(["a"]))
            .unwrap();
        queue
            .submit(TaskSpec::new("echo", json!({})).with_id("c").with_dependencies(["b"]))
            .unwrap();

        queue.cancel("a").unwrap();
        assert_eq!(queue.task("b").unwrap().state, TaskState::Cancelled);
        assert_eq!(queue.task("c").unwrap().state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_loop_runs_tasks_to_completion() {
        let queue = harness(2);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let loop_handle = tokio::spawn(queue.clone().run_forever(shutdown_rx));

        let id = queue
            .submit(TaskSpec::new("echo", json!({"v": 1})))
            .unwrap();

        for _ in 0..100 {
            if queue.task(&id).unwrap().state == TaskState::Completed {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.task(&id).unwrap().state, TaskState::Completed);

        // Cancelling any terminal task is a no-op.
        queue.cancel(&id).unwrap();
        assert_eq!(queue.task(&id).unwrap().state, TaskState::Completed);

        shutdown_tx.send(()).unwrap();
        loop_handle.await.unwrap();
    }
}
