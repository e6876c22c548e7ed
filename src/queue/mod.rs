//! Prioritized, dependency-aware task scheduling.

pub mod scheduler;
pub mod task;

pub use scheduler::PriorityTaskQueue;
pub use task::{Task, TaskId, TaskPriority, TaskSpec, TaskState};
