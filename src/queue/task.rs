use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub type TaskId = String;

/// Strict scheduling priority: a higher tier always dispatches before a
/// lower one. A continuous stream of high-priority tasks can starve lower
/// tiers; that is by spec, not mitigated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Normal,
    Low,
}

impl TaskPriority {
    pub const TIERS: [TaskPriority; 3] = [
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
    ];

    pub fn tier_index(self) -> usize {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Normal => 1,
            TaskPriority::Low => 2,
        }
    }
}

/// Task lifecycle states.
///
/// `Queued -> Running` happens exactly once per dispatch; retries stay
/// inside the executor and show up only as the attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Waiting,
    Running,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Submission descriptor for one action invocation.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Caller-assigned id; generated when absent.
    pub id: Option<TaskId>,
    /// Name of a registered action.
    pub action: String,
    pub params: Value,
    pub priority: TaskPriority,
    /// Tasks that must reach Completed before this one is eligible.
    pub dependencies: Vec<TaskId>,
    /// Per-task timeout override; falls back to the engine default.
    pub timeout: Option<Duration>,
    /// Per-task attempt budget override.
    pub max_attempts: Option<u32>,
    /// Stream identity for streaming actions; generated when absent.
    pub stream_id: Option<String>,
}

impl TaskSpec {
    pub fn new<S: Into<String>>(action: S, params: Value) -> Self {
        Self {
            id: None,
            action: action.into(),
            params,
            priority: TaskPriority::Normal,
            dependencies: Vec::new(),
            timeout: None,
            max_attempts: None,
            stream_id: None,
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_stream_id<S: Into<String>>(mut self, stream_id: S) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }
}

/// Tracked record of a submitted task. State is mutated only by the queue,
/// one critical section per mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub action: String,
    pub params: Value,
    pub priority: TaskPriority,
    pub dependencies: Vec<TaskId>,
    pub state: TaskState,
    pub attempts: u32,
    #[serde(skip)]
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    pub stream_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn from_spec(spec: TaskSpec, default_max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: spec.id.unwrap_or_else(cuid2::create_id),
            action: spec.action,
            params: spec.params,
            priority: spec.priority,
            dependencies: spec.dependencies,
            state: TaskState::Queued,
            attempts: 0,
            timeout: spec.timeout,
            max_attempts: spec.max_attempts.unwrap_or(default_max_attempts),
            stream_id: spec.stream_id,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}
